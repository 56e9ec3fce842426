//! Infrastructure layer: stores, the reservation service, background workers.
//!
//! The ledger and reservation stores are the durable-store seam. The in-memory
//! implementations execute every mutation as one conditional atomic update
//! (check precondition, apply, install -- all under a single lock
//! acquisition), which is the same contract a document store's conditional
//! single-document update or a relational compare-and-set column provides.

pub mod ledger_store;
pub mod reservation_store;
pub mod service;
pub mod workers;

pub use ledger_store::{InMemoryLedgerStore, LedgerStore};
pub use reservation_store::{InMemoryReservationStore, ReservationStore};
pub use service::ReservationService;
pub use workers::{ExpirySweeper, SweeperConfig, SweeperError, SweeperHandle, SweeperStats};
