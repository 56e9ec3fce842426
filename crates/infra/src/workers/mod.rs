//! Background workers.

pub mod sweeper;

pub use sweeper::{ExpirySweeper, SweeperConfig, SweeperError, SweeperHandle, SweeperStats};
