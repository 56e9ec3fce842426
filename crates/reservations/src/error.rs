//! Reservation error model.

use thiserror::Error;

use stockyard_ledger::LedgerError;

use crate::reservation::ReservationStatus;

/// Errors from the reservation state machine and store.
///
/// `NotFound`, `InvalidState` and `Expired` are expected business outcomes:
/// the checkout orchestrator turns them into "checkout expired" /
/// "already processed" responses rather than alarms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// No reservation with the given id.
    #[error("reservation not found")]
    NotFound,

    /// The reservation is not in a state that permits this transition.
    #[error("invalid state: reservation is {current}")]
    InvalidState { current: ReservationStatus },

    /// The hold lapsed before it was committed; the caller must re-reserve.
    #[error("reservation expired")]
    Expired,

    /// A concurrent caller transitioned the reservation first.
    #[error("stale status: expected {expected}, found {found}")]
    StaleStatus {
        expected: ReservationStatus,
        found: ReservationStatus,
    },

    /// Malformed input rejected before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The accompanying ledger mutation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ReservationError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<stockyard_core::DomainError> for ReservationError {
    fn from(err: stockyard_core::DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}
