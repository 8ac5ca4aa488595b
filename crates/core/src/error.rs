//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (validation,
/// lifecycle rules, stock guards). Storage concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An order status change that is not an edge of the lifecycle graph.
    #[error("invalid transition from '{from}' to '{to}' (allowed: {allowed})")]
    InvalidTransition {
        from: String,
        to: String,
        /// Comma-separated list of legal targets for `from`.
        allowed: String,
    },

    /// An edit was attempted on an order whose status forbids edits.
    #[error("order in status '{0}' is not editable")]
    OrderNotEditable(String),

    /// A non-correction adjustment would drive available stock negative.
    #[error("insufficient stock for '{sku}': requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: i64,
        available: i64,
    },

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code for API consumers.
    ///
    /// Codes are part of the external contract; Display messages are not.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::OrderNotEditable(_) => "order_not_editable",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::NotFound => "not_found",
        }
    }
}
