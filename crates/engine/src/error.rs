//! Engine-level error taxonomy.

use shopkeep_core::DomainError;
use shopkeep_storage::{Retryable, StoreError};
use thiserror::Error;

/// Errors surfaced by the mutation and query services.
///
/// Domain and storage failures pass through unchanged; collaborator edges
/// (carrier, shipping quoter) get their own variants so callers can tell a
/// rejected mutation from an upstream outage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("carrier error: {0}")]
    Carrier(String),

    #[error("shipping quote error: {0}")]
    Quote(String),
}

impl EngineError {
    pub fn carrier(message: impl Into<String>) -> Self {
        EngineError::Carrier(message.into())
    }

    pub fn quote(message: impl Into<String>) -> Self {
        EngineError::Quote(message.into())
    }

    /// Stable machine-readable code, passed through from the cause where one
    /// exists.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(err) => err.code(),
            EngineError::Store(err) => err.code(),
            EngineError::Carrier(_) => "carrier_error",
            EngineError::Quote(_) => "quote_error",
        }
    }

    /// True when the caller lost an optimistic-concurrency race and should
    /// re-read before retrying.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::VersionConflict { .. }))
    }
}

/// Only storage-transient failures are worth an automatic retry; domain
/// rejections and collaborator edges are not.
impl Retryable for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(err) if err.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pass_through_from_causes() {
        let err: EngineError = DomainError::validation("quantity must be positive").into();
        assert_eq!(err.code(), "validation_error");

        let err: EngineError = StoreError::VersionConflict {
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(err.code(), "version_conflict");
        assert!(err.is_version_conflict());

        assert_eq!(EngineError::carrier("label api 503").code(), "carrier_error");
    }
}
