use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use xabridge_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
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

    /// True for programming errors: wrong state, bad statement shape.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Validation | ErrorKind::PreconditionFailed
        )
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Validation => ErrorKind::Validation,
            ErrorClass::PreconditionFailed => ErrorKind::PreconditionFailed,
            ErrorClass::Conflict | ErrorClass::TransactionFailed => ErrorKind::TransactionFailed,
            ErrorClass::NotFound => ErrorKind::Store(StoreErrorKind::NotFound),
            ErrorClass::AlreadyExists => ErrorKind::Store(StoreErrorKind::AlreadyExists),
            ErrorClass::RecoveryInconsistency => ErrorKind::Recovery(RecoveryErrorKind::Inconsistent),
            ErrorClass::Corruption => ErrorKind::Recovery(RecoveryErrorKind::Corrupt),
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::Internal => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Statement or mutation shape is not supported.
    Validation,

    /// Operation issued in the wrong transaction state.
    PreconditionFailed,

    /// The backend could not commit after retrying.
    TransactionFailed,

    Store(StoreErrorKind),
    Recovery(RecoveryErrorKind),
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    NotFound,
    AlreadyExists,
}

///
/// RecoveryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RecoveryErrorKind {
    /// Prepared records need an explicit commit or rollback decision.
    Inconsistent,

    /// A persisted record no longer decodes.
    Corrupt,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Backend,
    Bridge,
    Config,
    Recovery,
    Statement,
    Storage,
    Worker,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Backend => Self::Backend,
            CoreErrorOrigin::Bridge => Self::Bridge,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Recovery => Self::Recovery,
            CoreErrorOrigin::Mutation | CoreErrorOrigin::Sql => Self::Statement,
            CoreErrorOrigin::Codec | CoreErrorOrigin::Serialize => Self::Storage,
            CoreErrorOrigin::Worker => Self::Worker,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_surface_as_transaction_failures() {
        let err: Error = InternalError::backend_conflict("write-write").into();

        assert_eq!(err.kind, ErrorKind::TransactionFailed);
        assert_eq!(err.origin, ErrorOrigin::Backend);
    }

    #[test]
    fn caller_errors_are_flagged() {
        let err = Error::new(ErrorKind::PreconditionFailed, ErrorOrigin::Worker, "twice");
        assert!(err.is_caller_error());

        let err = Error::new(
            ErrorKind::Recovery(RecoveryErrorKind::Inconsistent),
            ErrorOrigin::Recovery,
            "orphan",
        );
        assert!(!err.is_caller_error());
    }

    #[test]
    fn origin_display_is_the_variant_name() {
        assert_eq!(ErrorOrigin::Statement.to_string(), "Statement");
    }
}
