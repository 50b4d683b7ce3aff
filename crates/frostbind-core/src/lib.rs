//! Core runtime for FrostBind: record contracts, association wrappers,
//! binding strategies, validation contexts, and the query adaptation
//! layer, plus the ergonomics exported via the `prelude`.

pub mod assoc;
pub mod bind;
pub mod context;
pub mod dump;
pub mod error;
pub mod materialize;
pub mod model;
pub mod query;
pub mod row;
pub mod store;
pub mod strategy;
pub mod traits;
pub mod types;
pub mod validate;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use error::Error;

///
/// Prelude
///
/// Prelude contains only domain vocabulary. No stores, strategies, or
/// helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        assoc::{Many, Relation, Single},
        bind::Provided,
        model::{FieldKind, FieldModel, ModelDescriptor, RelationModel, RelationShape},
        traits::{Path, Record},
        types::Id,
        validate::{Validate, ValidateCtx},
        value::{FieldValue, Value},
    };
}
