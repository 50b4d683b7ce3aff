//! Foundational contracts: where a type lives in the system and what a
//! record type must expose to the binding runtime.

use crate::{assoc::Relation, bind::Provided, model::ModelDescriptor, validate::Validate, value::Value};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

///
/// Path
/// Fully-qualified schema path.
///

pub trait Path {
    const PATH: &'static str;
}

///
/// Record
///
/// A validated schema type whose instances double as live handles onto a
/// persisted row once bound. Implementations are hand-written (or
/// macro-generated) accessor-protocol types: every relation accessor calls
/// `bind::prepare_field`, every scalar setter calls `bind::write_field`.
///

pub trait Record:
    Path + Clone + Debug + PartialEq + Serialize + DeserializeOwned + Validate + 'static
{
    const MODEL: &'static ModelDescriptor;

    /// The persisted-counterpart binding handle for this instance.
    fn provided(&self) -> &Provided;

    /// Current identity value (`Null` when unset or undeclared).
    fn identity_value(&self) -> Value;

    /// Scalar field values in model order. Association fields never
    /// appear here; they travel through relation slots.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Apply one scalar field from the dynamic boundary.
    fn apply_field(&mut self, name: &str, value: &Value)
    -> Result<(), crate::validate::ValidateError>;

    /// Every association field, paired with its field name.
    fn relations(&self) -> Vec<(&'static str, &dyn Relation)>;
}
