//! Field types owned by the core: the set-once identity cell.

use crate::{
    validate::ValidateError,
    value::{FieldValue, Value},
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Id
///
/// Set-once identity field. Frozen after the first non-null assignment;
/// the store-assigned key flows back in through the same gate.
///

#[derive(Clone, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Id<K> {
    value: Option<K>,
}

impl<K> Id<K> {
    /// An unassigned identity.
    #[must_use]
    pub const fn unset() -> Self {
        Self { value: None }
    }

    /// An identity assigned at construction.
    #[must_use]
    pub const fn new(key: K) -> Self {
        Self { value: Some(key) }
    }

    #[must_use]
    pub const fn get(&self) -> Option<&K> {
        self.value.as_ref()
    }

    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl<K: FieldValue + PartialEq> Id<K> {
    /// Assign the identity. Fails once a non-null value is present.
    pub fn set(&mut self, model: &'static str, field: &str, key: K) -> Result<(), ValidateError> {
        if self.value.is_some() {
            return Err(ValidateError::IdentityReassigned {
                model,
                field: field.to_string(),
            });
        }

        self.value = Some(key);
        Ok(())
    }

    /// Absorb an identity from the dynamic boundary (revalidate, absorb).
    ///
    /// Re-assigning the identical value is a no-op; anything else after the
    /// first assignment is a reassignment failure.
    pub fn assign_from(
        &mut self,
        model: &'static str,
        field: &str,
        value: &Value,
    ) -> Result<(), ValidateError> {
        if value.is_null() {
            return Ok(());
        }

        let key: K = crate::validate::field_from_value(model, field, value)?;
        if let Some(current) = &self.value {
            if *current == key {
                return Ok(());
            }
            return Err(ValidateError::IdentityReassigned {
                model,
                field: field.to_string(),
            });
        }

        self.value = Some(key);
        Ok(())
    }
}

impl<K: FieldValue> Id<K> {
    /// Project into the dynamic boundary (`Null` when unset).
    #[must_use]
    pub fn to_value(&self) -> Value {
        match &self.value {
            Some(key) => key.to_value(),
            None => Value::Null,
        }
    }
}

impl<K> Default for Id<K> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<K: fmt::Debug> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(key) => write!(f, "Id({key:?})"),
            None => f.write_str("Id(unset)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_once_then_frozen() {
        let mut id = Id::<u64>::unset();
        assert!(!id.is_set());

        id.set("tests::T", "id", 1).unwrap();
        assert_eq!(id.get(), Some(&1));

        let err = id.set("tests::T", "id", 2).unwrap_err();
        assert!(matches!(err, ValidateError::IdentityReassigned { .. }));
    }

    #[test]
    fn assign_from_is_idempotent_for_equal_values() {
        let mut id = Id::<u64>::new(9);
        id.assign_from("tests::T", "id", &Value::Uint(9)).unwrap();

        let err = id
            .assign_from("tests::T", "id", &Value::Uint(10))
            .unwrap_err();
        assert!(matches!(err, ValidateError::IdentityReassigned { .. }));
    }

    #[test]
    fn assign_from_ignores_null() {
        let mut id = Id::<u64>::unset();
        id.assign_from("tests::T", "id", &Value::Null).unwrap();
        assert!(!id.is_set());
    }

    #[test]
    fn serde_is_transparent() {
        let id = Id::<u64>::new(4);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!(4));

        let back: Id<u64> = serde_json::from_value(serde_json::json!(null)).unwrap();
        assert!(!back.is_set());
    }
}
