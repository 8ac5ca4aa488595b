use std::time::Duration;

use thiserror::Error;

/// Storage operation error.
///
/// These are **infrastructure errors** (concurrency, availability, backend
/// faults) as opposed to domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic lock lost: another writer advanced the record.
    #[error("version conflict: expected version {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,

    /// Retryable backend failure (write conflict, broken connection, ...).
    /// Handled internally by the transaction coordinator.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// The unit of work exceeded its server-side time bound.
    #[error("unit of work timed out after {0:?}")]
    Timeout(Duration),

    /// Degraded-mode notice: the backend cannot provide multi-document
    /// transactions. Not fatal.
    #[error("storage backend does not support multi-document transactions")]
    TransactionsUnsupported,

    /// Non-retryable backend failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the coordinator should retry the unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::VersionConflict { .. } => "version_conflict",
            StoreError::NotFound => "not_found",
            StoreError::Transient(_) => "transient_storage_error",
            StoreError::Timeout(_) => "timeout",
            StoreError::TransactionsUnsupported => "transactions_unsupported",
            StoreError::Backend(_) => "storage_error",
        }
    }
}
