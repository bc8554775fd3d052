use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use tilestock_core::{AggregateRoot, BatchId, LocationId, MovementId, ProductId, UserId};
use tilestock_inventory::{
    InventoryRecord, MovementStatus, MovementType, NewMovement, RecordKey, StockBatch,
    StockMovement, StockThresholds,
};

use super::{AlertEvaluator, StockContext};
use crate::error::StockError;
use crate::store::{Committed, StockChange};

/// An on-hand change requested by admin tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reason: String,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
    pub unit_cost: Option<i64>,
    pub batch_id: Option<BatchId>,
}

impl StockAdjustment {
    /// A plain `adjustment`; use [`StockAdjustment::kind`] for purchases,
    /// sales, returns and damage.
    pub fn new(
        product_id: ProductId,
        location_id: LocationId,
        delta: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            location_id,
            delta,
            movement_type: MovementType::Adjustment,
            reason: reason.into(),
            actor: None,
            notes: None,
            unit_cost: None,
            batch_id: None,
        }
    }

    pub fn kind(mut self, movement_type: MovementType) -> Self {
        self.movement_type = movement_type;
        self
    }

    pub fn actor(mut self, actor: Option<UserId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn unit_cost(mut self, unit_cost: Option<i64>) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn batch(mut self, batch_id: Option<BatchId>) -> Self {
        self.batch_id = batch_id;
        self
    }

    fn key(&self) -> RecordKey {
        RecordKey::new(self.product_id, self.location_id)
    }

    fn movement(&self) -> NewMovement {
        NewMovement::new(
            self.movement_type,
            self.product_id,
            self.location_id,
            self.delta,
        )
        .reason(self.reason.clone())
        .notes(self.notes.clone())
        .performed_by(self.actor)
        .unit_cost(self.unit_cost)
        .batch(self.batch_id)
    }

    fn validate(&self) -> Result<(), StockError> {
        if !self.movement_type.is_manual() {
            return Err(StockError::validation(format!(
                "{} movements cannot be requested as adjustments",
                self.movement_type
            )));
        }
        if self.reason.trim().is_empty() {
            return Err(StockError::validation("adjustment reason is required"));
        }
        self.movement().validate()?;
        Ok(())
    }
}

/// Stock moved between two locations of the same product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub product_id: ProductId,
    pub from: LocationId,
    pub to: LocationId,
    pub quantity: i64,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
}

/// A received lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveBatch {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub batch_number: String,
    pub quantity: i64,
    pub unit_cost: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub actor: Option<UserId>,
}

/// Entry point for on-hand changes. Every successful call writes the record
/// change and its ledger entry in one commit, then re-evaluates alerts.
#[derive(Debug, Clone)]
pub struct AdjustmentFacade {
    ctx: StockContext,
    alerts: AlertEvaluator,
}

impl AdjustmentFacade {
    pub fn new(ctx: StockContext, alerts: AlertEvaluator) -> Self {
        Self { ctx, alerts }
    }

    /// Apply a signed on-hand change. Negative results are rejected with
    /// `InvalidState` before anything is written.
    #[instrument(
        skip(self, adjustment),
        fields(
            product_id = %adjustment.product_id,
            location_id = %adjustment.location_id,
            delta = adjustment.delta,
            movement_type = %adjustment.movement_type
        ),
        err
    )]
    pub fn adjust(&self, adjustment: StockAdjustment) -> Result<InventoryRecord, StockError> {
        adjustment.validate()?;
        let key = adjustment.key();

        let committed = self.ctx.config.retry.run("adjust", |_| {
            let record = self.ctx.store.get(key)?;
            record.apply_delta(adjustment.delta, 0, self.ctx.clock.now())?;

            let mut change = StockChange::new()
                .adjust(key, record.version(), adjustment.delta, 0)
                .movement(adjustment.movement());
            if let Some(batch_id) = adjustment.batch_id {
                let batch = self.ctx.store.batch(batch_id)?;
                if batch.product_id != key.product_id || batch.location_id != key.location_id {
                    return Err(StockError::validation(format!(
                        "batch {} does not belong to {key}",
                        batch.batch_number
                    )));
                }
                change = change.batch_delta(batch_id, adjustment.delta);
            }
            Ok(self.ctx.store.commit(change)?)
        })?;

        let record = self.finish(&committed, key)?;
        info!(
            on_hand = record.quantity_on_hand(),
            available = record.quantity_available(),
            "stock adjusted"
        );
        Ok(record)
    }

    /// Create the record for a product at a location.
    #[instrument(
        skip(self, thresholds),
        fields(product_id = %product_id, location_id = %location_id),
        err
    )]
    pub fn stock_location(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        thresholds: StockThresholds,
        initial_quantity: i64,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord, StockError> {
        if initial_quantity < 0 {
            return Err(StockError::validation("initial quantity cannot be negative"));
        }
        let record =
            InventoryRecord::new(product_id, location_id, thresholds, self.ctx.clock.now())?;
        let key = record.key();

        let mut change = StockChange::new().create_record(record);
        if initial_quantity > 0 {
            change = change.adjust(key, 0u64, initial_quantity, 0).movement(
                NewMovement::new(MovementType::Purchase, product_id, location_id, initial_quantity)
                    .reason("initial stock")
                    .performed_by(actor),
            );
        }
        let committed = self.ctx.store.commit(change)?;
        let record = self.finish(&committed, key)?;
        info!(on_hand = record.quantity_on_hand(), "location stocked");
        Ok(record)
    }

    #[instrument(skip(self), fields(product_id = %product_id, location_id = %location_id), err)]
    pub fn set_thresholds(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        thresholds: StockThresholds,
    ) -> Result<InventoryRecord, StockError> {
        thresholds.validate()?;
        let key = RecordKey::new(product_id, location_id);
        let committed = self.ctx.config.retry.run("set_thresholds", |_| {
            let record = self.ctx.store.get(key)?;
            Ok(self
                .ctx
                .store
                .commit(StockChange::new().thresholds(key, record.version(), thresholds))?)
        })?;
        self.finish(&committed, key)
    }

    /// Move stock between two locations in one commit. Returns the source and
    /// destination records.
    #[instrument(
        skip(self, transfer),
        fields(product_id = %transfer.product_id, from = %transfer.from, to = %transfer.to),
        err
    )]
    pub fn transfer(
        &self,
        transfer: Transfer,
    ) -> Result<(InventoryRecord, InventoryRecord), StockError> {
        if transfer.quantity <= 0 {
            return Err(StockError::validation("transfer quantity must be positive"));
        }
        if transfer.from == transfer.to {
            return Err(StockError::validation(
                "transfer source and destination must differ",
            ));
        }
        let source = RecordKey::new(transfer.product_id, transfer.from);
        let destination = RecordKey::new(transfer.product_id, transfer.to);

        let committed = self.ctx.config.retry.run("transfer", |_| {
            let from = self.ctx.store.get(source)?;
            let to = self.ctx.store.get(destination)?;
            if from.quantity_available() < transfer.quantity {
                return Err(StockError::InsufficientStock {
                    requested: transfer.quantity,
                    available: from.quantity_available(),
                });
            }

            let out = NewMovement::new(
                MovementType::TransferOut,
                transfer.product_id,
                transfer.from,
                -transfer.quantity,
            )
            .between(transfer.from, transfer.to)
            .reason("transfer")
            .notes(transfer.notes.clone())
            .performed_by(transfer.actor);
            let into = NewMovement::new(
                MovementType::TransferIn,
                transfer.product_id,
                transfer.to,
                transfer.quantity,
            )
            .between(transfer.from, transfer.to)
            .reason("transfer")
            .notes(transfer.notes.clone())
            .performed_by(transfer.actor);

            Ok(self.ctx.store.commit(
                StockChange::new()
                    .adjust(source, from.version(), -transfer.quantity, 0)
                    .adjust(destination, to.version(), transfer.quantity, 0)
                    .movement(out)
                    .movement(into),
            )?)
        })?;

        self.after_commit(&committed);
        let from = record_in(&committed, source)?;
        let to = record_in(&committed, destination)?;
        info!(quantity = transfer.quantity, "stock transferred");
        Ok((from, to))
    }

    /// Set on-hand to a physically counted value. The signed difference is
    /// booked as a `count_adjustment`; a matching count writes nothing.
    #[instrument(skip(self), fields(product_id = %product_id, location_id = %location_id), err)]
    pub fn record_count(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        counted: i64,
        actor: Option<UserId>,
        notes: Option<String>,
    ) -> Result<InventoryRecord, StockError> {
        if counted < 0 {
            return Err(StockError::validation("counted quantity cannot be negative"));
        }
        let key = RecordKey::new(product_id, location_id);

        let committed = self.ctx.config.retry.run("record_count", |_| {
            let record = self.ctx.store.get(key)?;
            if counted < record.quantity_reserved() {
                return Err(StockError::invalid_state(format!(
                    "counted {counted} is below the {} units currently reserved",
                    record.quantity_reserved()
                )));
            }
            let difference = counted - record.quantity_on_hand();
            if difference == 0 {
                return Ok(None);
            }
            let movement =
                NewMovement::new(MovementType::CountAdjustment, product_id, location_id, difference)
                    .reason("physical count")
                    .notes(notes.clone())
                    .performed_by(actor);
            let committed = self.ctx.store.commit(
                StockChange::new()
                    .adjust(key, record.version(), difference, 0)
                    .movement(movement),
            )?;
            Ok(Some(committed))
        })?;

        match committed {
            Some(committed) => self.finish(&committed, key),
            None => {
                debug!("count matches on-hand; nothing to book");
                Ok(self.ctx.store.get(key)?)
            }
        }
    }

    /// Receive a lot: creates the batch and books a `purchase` tagged with it.
    #[instrument(
        skip(self, receipt),
        fields(
            product_id = %receipt.product_id,
            location_id = %receipt.location_id,
            batch_number = %receipt.batch_number
        ),
        err
    )]
    pub fn receive_batch(&self, receipt: ReceiveBatch) -> Result<StockBatch, StockError> {
        let batch = StockBatch::receive(
            receipt.batch_number.clone(),
            receipt.product_id,
            receipt.location_id,
            receipt.quantity,
            receipt.unit_cost,
            receipt.expiry_date,
            self.ctx.clock.now(),
        )?;
        let key = RecordKey::new(receipt.product_id, receipt.location_id);

        let committed = self.ctx.config.retry.run("receive_batch", |_| {
            let record = self.ctx.store.get(key)?;
            let movement = NewMovement::new(
                MovementType::Purchase,
                receipt.product_id,
                receipt.location_id,
                receipt.quantity,
            )
            .reason(format!("batch {} received", receipt.batch_number))
            .unit_cost(receipt.unit_cost)
            .performed_by(receipt.actor)
            .batch(Some(batch.id));
            Ok(self.ctx.store.commit(
                StockChange::new()
                    .adjust(key, record.version(), receipt.quantity, 0)
                    .movement(movement)
                    .new_batch(batch.clone()),
            )?)
        })?;

        self.after_commit(&committed);
        let received = committed
            .batches
            .into_iter()
            .find(|b| b.id == batch.id)
            .ok_or_else(|| StockError::TransactionFailure("commit returned no batch".to_string()))?;
        info!(batch_id = %received.id, quantity = received.initial_quantity, "batch received");
        Ok(received)
    }

    /// Book a movement that has not physically happened yet (e.g. an inbound
    /// purchase order). The record is untouched until it is received.
    #[instrument(
        skip(self, adjustment),
        fields(product_id = %adjustment.product_id, location_id = %adjustment.location_id),
        err
    )]
    pub fn record_pending(&self, adjustment: StockAdjustment) -> Result<StockMovement, StockError> {
        adjustment.validate()?;
        let movement = self
            .ctx
            .store
            .append(adjustment.movement(), MovementStatus::Pending)?;
        debug!(movement_id = %movement.id, "pending movement recorded");
        Ok(movement)
    }

    /// Apply a pending movement to its record and complete it, in one commit.
    #[instrument(skip(self), fields(movement_id = %movement_id), err)]
    pub fn receive_pending(&self, movement_id: MovementId) -> Result<InventoryRecord, StockError> {
        let mut key = None;
        let committed = self.ctx.config.retry.run("receive_pending", |_| {
            let movement = self.ctx.store.movement(movement_id)?;
            if movement.status != MovementStatus::Pending {
                return Err(StockError::invalid_state(format!(
                    "movement {movement_id} is {:?}, not pending",
                    movement.status
                )));
            }
            let record_key = RecordKey::new(movement.product_id, movement.location_id);
            key = Some(record_key);
            let record = self.ctx.store.get(record_key)?;
            record.apply_delta(movement.quantity, 0, self.ctx.clock.now())?;

            let mut change = StockChange::new()
                .adjust(record_key, record.version(), movement.quantity, 0)
                .complete(movement_id);
            if let Some(batch_id) = movement.batch_id {
                change = change.batch_delta(batch_id, movement.quantity);
            }
            Ok(self.ctx.store.commit(change)?)
        })?;

        let key = key.ok_or_else(|| StockError::not_found(format!("movement {movement_id}")))?;
        self.finish(&committed, key)
    }

    /// Cancel a pending movement. Terminal movements are immutable.
    #[instrument(skip(self), fields(movement_id = %movement_id), err)]
    pub fn cancel_pending(&self, movement_id: MovementId) -> Result<StockMovement, StockError> {
        Ok(self
            .ctx
            .store
            .transition(movement_id, MovementStatus::Cancelled)?)
    }

    fn after_commit(&self, committed: &Committed) {
        self.ctx.announce(committed);
        self.alerts.after_commit(&committed.records, &committed.batches);
    }

    fn finish(&self, committed: &Committed, key: RecordKey) -> Result<InventoryRecord, StockError> {
        self.after_commit(committed);
        record_in(committed, key)
    }
}

fn record_in(committed: &Committed, key: RecordKey) -> Result<InventoryRecord, StockError> {
    committed
        .record(key)
        .cloned()
        .ok_or_else(|| {
            StockError::TransactionFailure(format!("commit returned no record for {key}"))
        })
}
