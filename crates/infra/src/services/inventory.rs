use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tilestock_core::{
    AlertId, CartSessionId, LocationId, MovementId, ProductId, ReservationId, UserId,
};
use tilestock_inventory::{
    InventoryRecord, RecordKey, ReleaseCause, ReservationHolder, StockAlert, StockBatch,
    StockLevels, StockMovement, StockReservation, StockThresholds,
};

use super::{
    AdjustmentFacade, AlertEvaluator, ReceiveBatch, ReleaseOutcome, ReservationManager,
    StockAdjustment, StockContext, Transfer,
};
use crate::clock::{Clock, SystemClock};
use crate::config::InventoryConfig;
use crate::error::StockError;
use crate::notify::StockObserver;
use crate::store::{InMemoryStockStore, StockStore};
use crate::workers::ExpirySweeper;

/// Ledger replay result for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub key: RecordKey,
    pub on_hand: i64,
    /// Sum of completed on-hand movements from zero.
    pub replayed: i64,
    pub movements: usize,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.on_hand == self.replayed
    }
}

/// The operations storefront and admin code call.
///
/// Cheap to clone; every clone shares the same store, clock and observers.
#[derive(Debug, Clone)]
pub struct InventoryService {
    ctx: StockContext,
    reservations: ReservationManager,
    adjustments: AdjustmentFacade,
    alerts: AlertEvaluator,
}

impl InventoryService {
    pub fn new(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>, config: InventoryConfig) -> Self {
        let ctx = StockContext::new(store, clock, config);
        let alerts = AlertEvaluator::new(ctx.clone());
        Self {
            reservations: ReservationManager::new(ctx.clone(), alerts.clone()),
            adjustments: AdjustmentFacade::new(ctx.clone(), alerts.clone()),
            alerts,
            ctx,
        }
    }

    /// Backed by an [`InMemoryStockStore`] on the wall clock.
    pub fn in_memory(config: InventoryConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryStockStore::with_clock(clock.clone()));
        Self::new(store, clock, config)
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.ctx.config
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn adjustments(&self) -> &AdjustmentFacade {
        &self.adjustments
    }

    pub fn alerts(&self) -> &AlertEvaluator {
        &self.alerts
    }

    pub fn subscribe(&self, observer: Arc<dyn StockObserver>) {
        self.ctx.notifier.subscribe(observer);
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.ctx.clone(), self.reservations.clone(), self.alerts.clone())
    }

    /// Levels at one location, or summed over every location of the product.
    pub fn get_availability(
        &self,
        product_id: ProductId,
        location_id: Option<LocationId>,
    ) -> Result<StockLevels, StockError> {
        match location_id {
            Some(location_id) => Ok(self
                .ctx
                .store
                .get(RecordKey::new(product_id, location_id))?
                .levels()),
            None => {
                let records = self.ctx.store.records_for_product(product_id)?;
                if records.is_empty() {
                    return Err(StockError::not_found(format!(
                        "no inventory records for product {product_id}"
                    )));
                }
                Ok(records.iter().map(InventoryRecord::levels).sum())
            }
        }
    }

    pub fn record(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<InventoryRecord, StockError> {
        Ok(self.ctx.store.get(RecordKey::new(product_id, location_id))?)
    }

    pub fn reserve_for_cart(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        session: CartSessionId,
        ttl: Option<Duration>,
    ) -> Result<ReservationId, StockError> {
        let holder = ReservationHolder::cart(session);
        Ok(self
            .reservations
            .reserve(product_id, location_id, quantity, holder, ttl)?
            .id)
    }

    /// Hold stock for an arbitrary holder (order, user, cart with price).
    pub fn reserve(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        holder: ReservationHolder,
        ttl: Option<Duration>,
    ) -> Result<StockReservation, StockError> {
        self.reservations
            .reserve(product_id, location_id, quantity, holder, ttl)
    }

    pub fn release_cart_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<ReleaseOutcome, StockError> {
        self.reservations
            .release(reservation_id, ReleaseCause::Released)
    }

    pub fn sync_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StockError> {
        self.reservations.sync_for_session(session)
    }

    pub fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<StockReservation, StockError> {
        self.reservations.confirm(reservation_id)
    }

    pub fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<StockReservation, StockError> {
        self.reservations.reservation(reservation_id)
    }

    pub fn reservations_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StockError> {
        self.reservations.reservations_for_session(session)
    }

    pub fn adjust_stock(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        delta: i64,
        reason: impl Into<String>,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord, StockError> {
        self.adjustments
            .adjust(StockAdjustment::new(product_id, location_id, delta, reason).actor(actor))
    }

    pub fn apply_adjustment(
        &self,
        adjustment: StockAdjustment,
    ) -> Result<InventoryRecord, StockError> {
        self.adjustments.adjust(adjustment)
    }

    pub fn stock_location(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        thresholds: StockThresholds,
        initial_quantity: i64,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord, StockError> {
        self.adjustments
            .stock_location(product_id, location_id, thresholds, initial_quantity, actor)
    }

    pub fn set_thresholds(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        thresholds: StockThresholds,
    ) -> Result<InventoryRecord, StockError> {
        self.adjustments
            .set_thresholds(product_id, location_id, thresholds)
    }

    pub fn transfer(
        &self,
        transfer: Transfer,
    ) -> Result<(InventoryRecord, InventoryRecord), StockError> {
        self.adjustments.transfer(transfer)
    }

    pub fn record_count(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        counted: i64,
        actor: Option<UserId>,
        notes: Option<String>,
    ) -> Result<InventoryRecord, StockError> {
        self.adjustments
            .record_count(product_id, location_id, counted, actor, notes)
    }

    pub fn receive_batch(&self, receipt: ReceiveBatch) -> Result<StockBatch, StockError> {
        self.adjustments.receive_batch(receipt)
    }

    pub fn batches(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<Vec<StockBatch>, StockError> {
        Ok(self
            .ctx
            .store
            .batches_for_record(RecordKey::new(product_id, location_id))?)
    }

    pub fn record_pending(&self, adjustment: StockAdjustment) -> Result<StockMovement, StockError> {
        self.adjustments.record_pending(adjustment)
    }

    pub fn receive_pending(&self, movement_id: MovementId) -> Result<InventoryRecord, StockError> {
        self.adjustments.receive_pending(movement_id)
    }

    pub fn cancel_pending(&self, movement_id: MovementId) -> Result<StockMovement, StockError> {
        self.adjustments.cancel_pending(movement_id)
    }

    /// Newest first. `limit` defaults to the configured page size.
    pub fn get_movement_history(
        &self,
        product_id: ProductId,
        location_id: Option<LocationId>,
        limit: Option<usize>,
    ) -> Result<Vec<StockMovement>, StockError> {
        let limit = limit.unwrap_or(self.ctx.config.history_limit);
        if limit == 0 {
            return Err(StockError::validation("history limit must be positive"));
        }
        Ok(self.ctx.store.history(product_id, location_id, limit)?)
    }

    pub fn get_active_alerts(&self) -> Result<Vec<StockAlert>, StockError> {
        self.alerts.active_alerts()
    }

    pub fn acknowledge_alert(
        &self,
        alert_id: AlertId,
        actor: Option<UserId>,
    ) -> Result<StockAlert, StockError> {
        self.alerts.acknowledge(alert_id, actor)
    }

    /// Replay completed movements for a record and compare with on-hand.
    pub fn verify_ledger(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<LedgerAudit, StockError> {
        let key = RecordKey::new(product_id, location_id);
        let record = self.ctx.store.get(key)?;
        let movements = self.ctx.store.completed_movements(key)?;
        Ok(LedgerAudit {
            key,
            on_hand: record.quantity_on_hand(),
            replayed: movements.iter().map(StockMovement::on_hand_delta).sum(),
            movements: movements.len(),
        })
    }
}
