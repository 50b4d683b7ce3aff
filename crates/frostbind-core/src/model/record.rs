use crate::model::{FieldModel, RelationModel};

///
/// ModelDescriptor
/// Minimal runtime model for one record type.
///

#[derive(Debug)]
pub struct ModelDescriptor {
    /// Fully-qualified Rust type path (for dispatch and diagnostics).
    pub path: &'static str,
    /// Stable external name used in cache keys and target routing.
    pub model_name: &'static str,
    /// Identity field (points at an entry in `fields`), if declared.
    pub identity: Option<&'static FieldModel>,
    /// Ordered scalar field list; association fields are not listed here.
    pub fields: &'static [FieldModel],
    /// Declared relation fields.
    pub relations: &'static [RelationModel],
}

impl ModelDescriptor {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&'static RelationModel> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Name of the identity field, if one is declared.
    #[must_use]
    pub fn identity_name(&self) -> Option<&'static str> {
        self.identity.map(|f| f.name)
    }

    /// Whether `name` is the declared identity field.
    #[must_use]
    pub fn is_identity(&self, name: &str) -> bool {
        self.identity_name() == Some(name)
    }
}
