//! Background workers.

mod expiry_sweeper;

pub use expiry_sweeper::{ExpirySweeper, SweepReport, SweeperHandle, SweeperStats};
