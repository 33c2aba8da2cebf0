//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock availability, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required input was missing or malformed (address, phone, field).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested color/size combination does not exist on the product.
    #[error("variant unavailable: {0}")]
    VariantUnavailable(String),

    /// The variant exists but does not have enough stock.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    /// A requested document (user, order, product) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent write invalidated this operation (retried or surfaced).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain invariant was violated (illegal status transition, etc.).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn variant_unavailable(msg: impl Into<String>) -> Self {
        Self::VariantUnavailable(msg.into())
    }

    pub fn insufficient_stock(msg: impl Into<String>) -> Self {
        Self::InsufficientStock(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
