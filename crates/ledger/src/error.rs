//! Ledger error model.

use thiserror::Error;

/// Errors from ledger transitions and the ledger store.
///
/// `NotEnoughStock` is an expected business outcome callers branch on;
/// `InvariantViolation` must never occur given correct inputs and is treated
/// as a defect (fail closed, log loudly, never auto-repair).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Not enough available stock to satisfy the request. No counter changed.
    #[error("not enough stock: requested {requested}, available {available}")]
    NotEnoughStock { requested: u64, available: u64 },

    /// A counter invariant would be broken. Defect-class, not a user error.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// Malformed input (e.g. zero quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The underlying store failed (e.g. poisoned lock, connectivity).
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for expected business outcomes a caller handles as control flow.
    pub fn is_business_outcome(&self) -> bool {
        matches!(self, Self::NotEnoughStock { .. })
    }
}
