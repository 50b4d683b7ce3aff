use crate::{
    bind::BindError,
    model::ModelDescriptor,
    traits::Record,
    validate::ValidateError,
    value::Value,
};
use std::collections::BTreeMap;

///
/// PatchMode
///
/// The two partial shapes: `Create` (identity absent) and `Update`
/// (identity frozen). Both reject identity material at `set` time.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchMode {
    Create,
    Update,
}

///
/// Patch
///
/// Input-validated partial shape of one model: a subset of scalar fields,
/// each kind-checked at `set` time, applied via `bind::absorb`.
///

#[derive(Debug)]
pub struct Patch {
    model: &'static ModelDescriptor,
    mode: PatchMode,
    fields: BTreeMap<&'static str, Value>,
}

impl Patch {
    /// A create-shape patch: the identity field must be absent.
    #[must_use]
    pub fn create<M: Record>() -> Self {
        Self {
            model: M::MODEL,
            mode: PatchMode::Create,
            fields: BTreeMap::new(),
        }
    }

    /// An update-shape patch: the identity field is frozen.
    #[must_use]
    pub fn update<M: Record>() -> Self {
        Self {
            model: M::MODEL,
            mode: PatchMode::Update,
            fields: BTreeMap::new(),
        }
    }

    /// Add one field. Unknown fields, identity material, and
    /// kind-incompatible values are rejected.
    pub fn set(mut self, field: &str, value: Value) -> Result<Self, ValidateError> {
        let Some(model_field) = self.model.field(field) else {
            return Err(ValidateError::UnknownField {
                model: self.model.path,
                field: field.to_string(),
            });
        };
        if self.model.is_identity(field) {
            return Err(ValidateError::IdentityReassigned {
                model: self.model.path,
                field: field.to_string(),
            });
        }
        if !model_field.kind.admits(&value) {
            return Err(ValidateError::KindMismatch {
                model: self.model.path,
                field: field.to_string(),
                expected: model_field.kind.name(),
                found: value.kind_name(),
            });
        }

        self.fields.insert(model_field.name, value);

        Ok(self)
    }

    #[must_use]
    pub const fn mode(&self) -> PatchMode {
        self.mode
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub(crate) fn check<M: Record>(&self) -> Result<(), BindError> {
        if std::ptr::eq(self.model, M::MODEL) {
            Ok(())
        } else {
            Err(BindError::PatchModelMismatch {
                expected: self.model.path,
                found: M::MODEL.path,
            })
        }
    }
}
