use crate::value::Value;

///
/// FieldModel
/// Runtime scalar-field metadata used by validation and counterpart creation.
///

#[derive(Debug)]
pub struct FieldModel {
    /// Field name as used on rows, patches, and snapshots.
    pub name: &'static str,
    /// Runtime type shape (no schema-layer nodes).
    pub kind: FieldKind,
}

///
/// FieldKind
///
/// Minimal type surface needed by the validator and the write-through
/// protocol. Aligned with `Value` variants.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Uint,
    Float,
    Text,
    Bytes,
    List(&'static FieldKind),

    /// Marker for fields the dynamic surface cannot express.
    Unsupported,
}

impl FieldKind {
    /// Whether a dynamic value is admissible for this kind.
    ///
    /// `Null` is always admissible; optionality is enforced by the typed
    /// field itself, not by the kind table.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Uint, Value::Uint(_))
            | (Self::Float, Value::Float(_))
            | (Self::Text, Value::Text(_))
            | (Self::Bytes, Value::Bytes(_)) => true,
            (Self::List(inner), Value::List(items)) => items.iter().all(|v| inner.admits(v)),
            _ => false,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::List(_) => "list",
            Self::Unsupported => "unsupported",
        }
    }
}

///
/// RelationModel
/// Declared relation field metadata.
///

#[derive(Debug)]
pub struct RelationModel {
    /// Relation field name as used on rows and accessors.
    pub name: &'static str,
    pub shape: RelationShape,
    /// Fully-qualified path of the related record type.
    pub target_path: &'static str,
}

///
/// RelationShape
///
/// The two association shapes. `Single { required }` carries the
/// nullability of the relation; collections are never null, only empty.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationShape {
    Single { required: bool },
    Many,
}

impl RelationShape {
    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(self, Self::Many)
    }
}
