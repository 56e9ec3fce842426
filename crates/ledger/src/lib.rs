//! Stock ledger domain module.
//!
//! This crate contains the per-(product, warehouse) stock counters and the
//! invariant-preserving transitions over them, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). The ledger knows
//! nothing about reservations; it is a counter machine, and the counters are
//! its whole world.

pub mod error;
pub mod row;
pub mod selector;

pub use error::LedgerError;
pub use row::{StockLedgerRow, StockLevels};
pub use selector::best_warehouse;
