//! Infrastructure layer: stores, services, background workers, config.
//!
//! ```text
//! caller → InventoryService
//!            ├─ AdjustmentFacade ──┐
//!            └─ ReservationManager ┴─ StockTransaction::commit (record + ledger + reservation)
//!                                       └─ after commit: StockNotifier, AlertEvaluator
//! ExpirySweeper (thread) → ReservationManager::release(expired)
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod retry;
pub mod services;
pub mod store;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, InventoryConfig};
pub use error::{StockError, StoreError};
pub use notify::{BusObserver, StockNotifier, StockObserver};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use services::{
    AdjustmentFacade, AlertEvaluator, InventoryService, LedgerAudit, ReceiveBatch,
    ReleaseOutcome, ReservationManager, StockAdjustment, StockContext, Transfer,
};
pub use store::{InMemoryStockStore, StockChange, StockStore};
pub use workers::{ExpirySweeper, SweepReport, SweeperHandle};
