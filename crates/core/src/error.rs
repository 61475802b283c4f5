//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// A closed taxonomy so callers branch on kind rather than message text.
/// Keep this focused on deterministic business failures; infrastructure
/// concerns (connection loss, serialization) belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (missing/out-of-range arguments).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested resource (order/project/unit/record) was not found.
    #[error("not found")]
    NotFound,

    /// An illegal status change was attempted, including misuse of the
    /// refund back-edge.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Not enough available units at reservation or allocation time.
    #[error("insufficient inventory: {0}")]
    InsufficientInventory(String),

    /// The caller does not own the order being acted on.
    #[error("permission denied")]
    PermissionDenied,

    /// Payment-callback verification failed (amount or order-number mismatch).
    #[error("payment mismatch: {0}")]
    PaymentMismatch(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientInventory(msg.into())
    }

    pub fn payment_mismatch(msg: impl Into<String>) -> Self {
        Self::PaymentMismatch(msg.into())
    }
}
