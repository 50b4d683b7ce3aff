//! ## Crate layout
//! - `core`: runtime data model, association wrappers, binding strategies,
//!   validation contexts, and the query adaptation layer.
//! - `error`: the public error taxonomy mapped from runtime errors.
//!
//! The `prelude` module mirrors the surface used by schema-defining code.

pub use frostbind_core as core;

mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        assoc::{Many, Relation as _, Single},
        bind::{self, Patch, PatchMode, Provided},
        context, dump,
        dump::{DumpOptions, FieldTree},
        materialize,
        model::{FieldKind, FieldModel, ModelDescriptor, RelationModel, RelationShape},
        query, strategy,
        strategy::{BindingStrategy as _, CacheStrategy, NoopStrategy, StoreStrategy},
        traits::{Path as _, Record as _},
        types::Id,
        validate::{Validate as _, ValidateCtx},
        value::{FieldValue as _, Value},
    };
    pub use serde::{Deserialize, Serialize};
}
