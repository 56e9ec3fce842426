//! Reservation domain module.
//!
//! A reservation is a time-bounded claim on a quantity of stock in one
//! warehouse. This crate owns the entity and its state machine
//! (RESERVED -> CONFIRMED | RELEASED | EXPIRED) as pure domain logic; the
//! ledger debit/credit that accompanies each transition lives behind the
//! store traits in `stockyard-infra`.

pub mod error;
pub mod reservation;

pub use error::ReservationError;
pub use reservation::{Correlation, HoldWindow, Reservation, ReservationStatus};
