use crate::{
    assoc::AssocError,
    bind::BindError,
    dump::DumpError,
    materialize::MaterializeError,
    query::QueryError,
    store::{CacheError, StoreError},
    strategy::{RegistryError, StrategyError},
    validate::ValidateError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without
/// notice. The facade crate maps this onto its public taxonomy.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        matches!(self.class, ErrorClass::Suspended)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Unsupported,
    /// A load could not complete synchronously; retry is safe.
    Suspended,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::Suspended => "suspended",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Assoc => "assoc",
            Self::Bind => "bind",
            Self::Strategy => "strategy",
            Self::Store => "store",
            Self::Cache => "cache",
            Self::Query => "query",
            Self::Validate => "validate",
            Self::Serialize => "serialize",
        };
        write!(f, "{label}")
    }
}

impl From<AssocError> for Error {
    fn from(err: AssocError) -> Self {
        let class = match &err {
            AssocError::AwaitRequired { .. } | AssocError::LoadForbidden { .. } => {
                ErrorClass::Suspended
            }
            AssocError::RequiredRelation { .. } | AssocError::InvalidValue { .. } => {
                ErrorClass::Validation
            }
            AssocError::UnsupportedOperation { .. } => ErrorClass::Unsupported,
            AssocError::IndexOutOfBounds { .. } => ErrorClass::Validation,
            AssocError::UnboundOwner { .. }
            | AssocError::Store { .. }
            | AssocError::Strategy { .. }
            | AssocError::Materialize { .. }
            | AssocError::ShapeMismatch { .. } => ErrorClass::Internal,
        };

        Self::new(class, ErrorOrigin::Assoc, err.to_string())
    }
}

impl From<ValidateError> for Error {
    fn from(err: ValidateError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Validate, err.to_string())
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        let class = match &err {
            RegistryError::AlreadyRegistered { .. } => ErrorClass::Conflict,
            RegistryError::CapabilityMissing { .. } => ErrorClass::Unsupported,
        };

        Self::new(class, ErrorOrigin::Strategy, err.to_string())
    }
}

impl From<StrategyError> for Error {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::Registry(inner) => inner.into(),
            StrategyError::Store(inner) => inner.into(),
            StrategyError::Cache(inner) => inner.into(),
            StrategyError::Serialize { .. } => {
                Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, err.to_string())
            }
            StrategyError::Materialize(inner) => (*inner).into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        let class = match &err {
            StoreError::AwaitRequired { .. } | StoreError::LoadForbidden { .. } => {
                ErrorClass::Suspended
            }
            StoreError::NotFound { .. } => ErrorClass::NotFound,
            StoreError::Backend { .. } => ErrorClass::Internal,
        };

        Self::new(class, ErrorOrigin::Store, err.to_string())
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Cache, err.to_string())
    }
}

impl From<MaterializeError> for Error {
    fn from(err: MaterializeError) -> Self {
        match err {
            MaterializeError::Validate(inner) => inner.into(),
            other => Self::new(ErrorClass::Internal, ErrorOrigin::Strategy, other.to_string()),
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NoResult { .. } => {
                Self::new(ErrorClass::NotFound, ErrorOrigin::Query, err.to_string())
            }
            QueryError::NotExecutable { .. } => {
                Self::new(ErrorClass::Unsupported, ErrorOrigin::Query, err.to_string())
            }
            QueryError::Store { source, .. } => source.into(),
            QueryError::Materialize(inner) => inner.into(),
        }
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Unbound { .. } => {
                Self::new(ErrorClass::Internal, ErrorOrigin::Bind, err.to_string())
            }
            BindError::PatchModelMismatch { .. } => {
                Self::new(ErrorClass::Validation, ErrorOrigin::Bind, err.to_string())
            }
            BindError::Assoc(inner) => inner.into(),
            BindError::Validate(inner) => inner.into(),
            BindError::Strategy(inner) => inner.into(),
        }
    }
}

impl From<DumpError> for Error {
    fn from(err: DumpError) -> Self {
        match err {
            DumpError::Validate(inner) => inner.into(),
            other => Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, other.to_string()),
        }
    }
}
