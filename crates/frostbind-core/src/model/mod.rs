//! Runtime schema metadata for records.
//!
//! Descriptors are static tables declared alongside each record type; the
//! runtime plans validation, counterpart creation, and relation handling
//! from them without touching the typed structs.

mod field;
mod record;

pub use field::{FieldKind, FieldModel, RelationModel, RelationShape};
pub use record::ModelDescriptor;
