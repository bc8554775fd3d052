//! Application services over a [`StockStore`].
//!
//! Every write follows the same cycle: read the record, decide against the
//! read state, commit a [`StockChange`](crate::store::StockChange) carrying the
//! read version, retry on conflict. After a successful commit the services
//! notify observers and re-evaluate alerts; neither step can fail the write.

mod adjustments;
mod alerts;
mod inventory;
mod reservations;

pub use adjustments::{AdjustmentFacade, ReceiveBatch, StockAdjustment, Transfer};
pub use alerts::AlertEvaluator;
pub use inventory::{InventoryService, LedgerAudit};
pub use reservations::{ReleaseOutcome, ReservationManager};

use std::sync::Arc;

use tilestock_inventory::StockEvent;

use crate::clock::Clock;
use crate::config::InventoryConfig;
use crate::error::StockError;
use crate::notify::StockNotifier;
use crate::store::{Committed, StockStore};

/// Handles shared by every service.
#[derive(Debug, Clone)]
pub struct StockContext {
    pub store: Arc<dyn StockStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<InventoryConfig>,
    pub notifier: StockNotifier,
}

impl StockContext {
    pub fn new(
        store: Arc<dyn StockStore>,
        clock: Arc<dyn Clock>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config: Arc::new(config),
            notifier: StockNotifier::new(),
        }
    }

    /// Publish record and reservation changes from a commit.
    pub(crate) fn announce(&self, committed: &Committed) {
        let now = self.clock.now();
        let mut events: Vec<StockEvent> = committed
            .records
            .iter()
            .map(StockEvent::record_changed)
            .collect();
        if let Some(reservation) = &committed.reservation {
            events.push(StockEvent::reservation_changed(reservation, now));
        }
        self.notifier.notify(&events);
    }
}

pub(crate) fn chrono_duration(d: std::time::Duration) -> Result<chrono::Duration, StockError> {
    chrono::Duration::from_std(d)
        .map_err(|_| StockError::validation(format!("duration {d:?} is out of range")))
}
