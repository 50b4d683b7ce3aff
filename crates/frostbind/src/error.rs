use derive_more::Display;
use frostbind_core::error::{
    Error as CoreError, ErrorClass as CoreErrorClass, ErrorOrigin as CoreErrorOrigin,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Suspended)
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        Self::new(err.class.into(), err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Field or relation validation failed; the input is wrong.
    Validation,

    /// A must-exist lookup found nothing.
    NotFound,

    /// Registration or state conflict at setup time.
    Conflict,

    /// The operation is not supported, by design.
    Unsupported,

    /// A load could not complete synchronously; a corrected retry (e.g.
    /// awaiting, or eager-loading options) is safe.
    Suspended,

    /// The caller cannot remediate this.
    Internal,
}

impl From<CoreErrorClass> for ErrorKind {
    fn from(class: CoreErrorClass) -> Self {
        match class {
            CoreErrorClass::Validation => Self::Validation,
            CoreErrorClass::NotFound => Self::NotFound,
            CoreErrorClass::Conflict => Self::Conflict,
            CoreErrorClass::Unsupported => Self::Unsupported,
            CoreErrorClass::Suspended => Self::Suspended,
            CoreErrorClass::Internal => Self::Internal,
        }
    }
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Assoc,
    Bind,
    Strategy,
    Store,
    Cache,
    Query,
    Validate,
    Serialize,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Assoc => Self::Assoc,
            CoreErrorOrigin::Bind => Self::Bind,
            CoreErrorOrigin::Strategy => Self::Strategy,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Cache => Self::Cache,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Validate => Self::Validate,
            CoreErrorOrigin::Serialize => Self::Serialize,
        }
    }
}
