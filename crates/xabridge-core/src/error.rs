use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable classification.
/// Every fallible surface of the core funnels into this type so callers can
/// branch on `class` without parsing messages.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a statement validation error.
    pub(crate) fn sql_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Sql, message)
    }

    /// Construct a worker-origin precondition failure.
    pub(crate) fn worker_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PreconditionFailed, ErrorOrigin::Worker, message)
    }

    /// Construct a worker-origin internal error.
    pub(crate) fn worker_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Worker, message)
    }

    /// Construct a bridge-origin precondition failure.
    pub(crate) fn bridge_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PreconditionFailed, ErrorOrigin::Bridge, message)
    }

    pub(crate) fn bridge_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Bridge, message)
    }

    /// Construct a backend-origin write that does not fit the target table.
    pub fn backend_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Backend, message)
    }

    /// Construct a backend-origin write conflict.
    ///
    /// Conflicts are the only retryable class; the backend retry loop owns them.
    pub fn backend_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Conflict, ErrorOrigin::Backend, message)
    }

    /// Construct a backend-origin terminal transaction failure.
    pub fn backend_transaction_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TransactionFailed, ErrorOrigin::Backend, message)
    }

    pub fn backend_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Backend, message)
    }

    pub fn backend_already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AlreadyExists, ErrorOrigin::Backend, message)
    }

    pub fn backend_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Backend, message)
    }

    pub fn backend_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Backend, message)
    }

    /// Construct a recovery-origin not-found error.
    pub(crate) fn recovery_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Recovery, message)
    }

    /// Construct a recovery-origin inconsistency error.
    pub(crate) fn recovery_inconsistency(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::RecoveryInconsistency,
            ErrorOrigin::Recovery,
            message,
        )
    }

    /// Construct a recovery-origin corruption error.
    pub(crate) fn recovery_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Recovery, message)
    }

    /// Construct a codec-origin corruption error.
    pub(crate) fn codec_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Codec, message)
    }

    /// Construct a codec-origin unsupported error.
    pub(crate) fn codec_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Codec, message)
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message)
    }

    /// True when the backend may transparently re-run the transaction.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    #[must_use]
    pub const fn is_precondition_failed(&self) -> bool {
        matches!(self.class, ErrorClass::PreconditionFailed)
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.class, ErrorClass::Validation)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
///
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorClass {
    AlreadyExists,
    Conflict,
    Corruption,
    Internal,
    NotFound,
    PreconditionFailed,
    RecoveryInconsistency,
    TransactionFailed,
    Unsupported,
    Validation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::NotFound => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::RecoveryInconsistency => "recovery_inconsistency",
            Self::TransactionFailed => "transaction_failed",
            Self::Unsupported => "unsupported",
            Self::Validation => "validation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorOrigin {
    Backend,
    Bridge,
    Codec,
    Config,
    Mutation,
    Recovery,
    Serialize,
    Sql,
    Worker,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Backend => "backend",
            Self::Bridge => "bridge",
            Self::Codec => "codec",
            Self::Config => "config",
            Self::Mutation => "mutation",
            Self::Recovery => "recovery",
            Self::Serialize => "serialize",
            Self::Sql => "sql",
            Self::Worker => "worker",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(InternalError::backend_conflict("write-write").is_retryable());
        assert!(!InternalError::backend_transaction_failed("gave up").is_retryable());
        assert!(!InternalError::sql_validation("bad where").is_retryable());
    }

    #[test]
    fn display_with_class_prefixes_origin_and_class() {
        let err = InternalError::worker_precondition("commit after prepare");

        assert_eq!(
            err.display_with_class(),
            "worker:precondition_failed: commit after prepare"
        );
    }
}
