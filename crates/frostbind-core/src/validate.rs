//! Validator entry point: model kind-checks plus the type's own rules,
//! collecting issues by field path.

use crate::{
    traits::Record,
    value::{FieldValue, Value},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// ValidateError
///

#[derive(Debug, ThisError)]
pub enum ValidateError {
    #[error("validation failed")]
    ValidationFailed(BTreeMap<String, Vec<String>>),

    #[error("unknown field '{field}' on {model}")]
    UnknownField { model: &'static str, field: String },

    #[error("field '{field}' on {model} expects {expected}, found {found}")]
    KindMismatch {
        model: &'static str,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("identity field '{field}' on {model} cannot be reassigned")]
    IdentityReassigned { model: &'static str, field: String },
}

impl ValidateError {
    /// All issue messages for one field path, if this is a collected failure.
    #[must_use]
    pub fn issues_for(&self, path: &str) -> Option<&[String]> {
        match self {
            Self::ValidationFailed(issues) => issues.get(path).map(Vec::as_slice),
            _ => None,
        }
    }
}

///
/// Validate
///
/// Per-type validation rules. The default is permissive; record types
/// override to add domain constraints on top of the model kind-check.
///

pub trait Validate {
    fn validate(&self, ctx: &mut ValidateCtx) {
        let _ = ctx;
    }
}

///
/// ValidateCtx
/// Issue collector keyed by field path.
///

#[derive(Debug, Default)]
pub struct ValidateCtx {
    issues: BTreeMap<String, Vec<String>>,
}

impl ValidateCtx {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issues: BTreeMap::new(),
        }
    }

    pub fn issue(&mut self, field: &str, message: impl Into<String>) {
        self.issues
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn into_result(self) -> Result<(), ValidateError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidateError::ValidationFailed(self.issues))
        }
    }
}

///
/// validate
/// Validate one record: dynamic kind-check against the model descriptor,
/// then the type's own rules. All issues are collected before failing.
///
pub fn validate<M: Record>(record: &M) -> Result<(), ValidateError> {
    let mut ctx = ValidateCtx::new();

    for (name, value) in record.field_values() {
        match M::MODEL.field(name) {
            Some(field) if field.kind.admits(&value) => {}
            Some(field) => ctx.issue(
                name,
                format!("expects {}, found {}", field.kind.name(), value.kind_name()),
            ),
            None => ctx.issue(name, "not declared on the model"),
        }
    }

    record.validate(&mut ctx);

    ctx.into_result()
}

/// Decode one typed field from a dynamic value, failing with a kind
/// mismatch that names the model and field.
pub fn field_from_value<T: FieldValue>(
    model: &'static str,
    field: &str,
    value: &Value,
) -> Result<T, ValidateError> {
    T::from_value(value).ok_or_else(|| ValidateError::KindMismatch {
        model,
        field: field.to_string(),
        expected: std::any::type_name::<T>(),
        found: value.kind_name(),
    })
}
