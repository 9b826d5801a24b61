//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Every
/// variant carries enough context to render an actionable message to the
/// caller (offending document, item, quantities).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (non-positive quantity/price, empty line list).
    /// Rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A transition is not allowed from the current state (accepting a
    /// cancelled quote, resubmitting a frozen declaration, double-releasing
    /// an escrow). Surfaced verbatim, never retried.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The requested document/declaration/escrow is unknown for the tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// Emission would drive an item's stock negative. The whole emission is
    /// aborted; no partial stock movement.
    #[error("insufficient stock for item {item}: requested {requested}, available {available}")]
    InsufficientStock {
        item: AggregateId,
        requested: Decimal,
        available: Decimal,
    },

    /// A quote was accepted past its validity date.
    #[error("expired: {0}")]
    Expired(String),

    /// Lock/version conflict on a hot row. Safe to retry the same command a
    /// bounded number of times.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    /// Whether an automatic bounded retry of the same command is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}
