use tracing::{debug, warn};

use tilestock_core::{AlertId, BatchId, UserId};
use tilestock_inventory::{
    AlertReconciliation, InventoryRecord, RecordKey, StockAlert, StockBatch, StockEvent,
};

use super::{StockContext, chrono_duration};
use crate::error::StockError;

/// Turns record and batch state into persisted alerts.
///
/// Evaluation is pure ([`tilestock_inventory::evaluate`]) but runs inside the
/// store against the current record, so two concurrent evaluations cannot both
/// raise the same alert and a slow one cannot reinstate a cleared alert.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    ctx: StockContext,
}

impl AlertEvaluator {
    pub fn new(ctx: StockContext) -> Self {
        Self { ctx }
    }

    /// Threshold alerts for the record as it is stored now, not as any one
    /// commit left it.
    pub fn evaluate_record(&self, key: RecordKey) -> Result<AlertReconciliation, StockError> {
        let outcome = self.ctx.store.reconcile_record_alerts(key)?;
        self.announce(&outcome);
        Ok(outcome)
    }

    /// `expiring` alerts for one batch (resolved once it is depleted).
    pub fn evaluate_batch(&self, batch_id: BatchId) -> Result<AlertReconciliation, StockError> {
        let window = chrono_duration(self.ctx.config.batch_expiry_window)?;
        let outcome =
            self.ctx
                .store
                .reconcile_batch_alerts(batch_id, self.ctx.clock.now(), window)?;
        self.announce(&outcome);
        Ok(outcome)
    }

    /// Re-check every batch that carries an expiry date.
    pub fn evaluate_batches(&self) -> Result<AlertReconciliation, StockError> {
        let mut total = AlertReconciliation::default();
        for batch in self.ctx.store.batches_with_expiry()? {
            let outcome = self.evaluate_batch(batch.id)?;
            total.raised.extend(outcome.raised);
            total.updated.extend(outcome.updated);
            total.resolved.extend(outcome.resolved);
        }
        Ok(total)
    }

    /// Post-commit hook: failures are logged, never returned.
    pub(crate) fn after_commit(&self, records: &[InventoryRecord], batches: &[StockBatch]) {
        for record in records {
            if let Err(err) = self.evaluate_record(record.key()) {
                warn!(record = %record.key(), error = %err, "alert evaluation failed");
            }
        }
        for batch in batches.iter().filter(|b| b.expiry_date.is_some()) {
            if let Err(err) = self.evaluate_batch(batch.id) {
                warn!(batch_id = %batch.id, error = %err, "batch alert evaluation failed");
            }
        }
    }

    pub fn active_alerts(&self) -> Result<Vec<StockAlert>, StockError> {
        Ok(self.ctx.store.active_alerts()?)
    }

    pub fn acknowledge(&self, id: AlertId, by: Option<UserId>) -> Result<StockAlert, StockError> {
        Ok(self.ctx.store.acknowledge_alert(id, by)?)
    }

    fn announce(&self, outcome: &AlertReconciliation) {
        if outcome.is_empty() {
            return;
        }
        debug!(
            raised = outcome.raised.len(),
            updated = outcome.updated.len(),
            resolved = outcome.resolved.len(),
            "alerts reconciled"
        );
        let events: Vec<StockEvent> = outcome
            .raised
            .iter()
            .map(StockEvent::alert_raised)
            .chain(outcome.resolved.iter().map(StockEvent::alert_resolved))
            .collect();
        self.ctx.notifier.notify(&events);
    }
}
