//! Storage boundary for the stock subsystem.
//!
//! Reads go through one trait per entity. Every write goes through
//! [`StockTransaction::commit`]: a [`StockChange`] is applied all-or-nothing, so a
//! record mutation and its ledger entry can never be observed apart.

mod in_memory;

pub use in_memory::InMemoryStockStore;

use chrono::{DateTime, Duration, Utc};

use tilestock_core::{
    AlertId, BatchId, CartSessionId, ExpectedVersion, MovementId, ProductId, LocationId,
    ReservationId, UserId,
};
use tilestock_inventory::{
    AlertReconciliation, InventoryRecord, MovementStatus,
    NewMovement, RecordKey, ReservationStatus, StockAlert, StockBatch, StockMovement,
    StockReservation, StockThresholds,
};

use crate::error::StoreError;

/// What happens to one record inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    Quantities {
        delta_on_hand: i64,
        delta_reserved: i64,
    },
    Thresholds(StockThresholds),
}

/// A versioned write against one inventory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMutation {
    pub key: RecordKey,
    pub expected_version: ExpectedVersion,
    pub update: RecordUpdate,
}

/// Insert (no `expected_status`) or compare-and-swap a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationWrite {
    pub reservation: StockReservation,
    pub expected_status: Option<ReservationStatus>,
}

/// Everything one operation writes, committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockChange {
    pub create_records: Vec<InventoryRecord>,
    pub mutations: Vec<RecordMutation>,
    /// Appended with `status=completed` when the commit succeeds.
    pub movements: Vec<NewMovement>,
    /// Pending ledger entries moved to `completed` by this commit.
    pub complete_pending: Vec<MovementId>,
    pub reservation: Option<ReservationWrite>,
    pub new_batches: Vec<StockBatch>,
    pub batch_deltas: Vec<(BatchId, i64)>,
}

impl StockChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_record(mut self, record: InventoryRecord) -> Self {
        self.create_records.push(record);
        self
    }

    pub fn adjust(
        mut self,
        key: RecordKey,
        expected_version: impl Into<ExpectedVersion>,
        delta_on_hand: i64,
        delta_reserved: i64,
    ) -> Self {
        self.mutations.push(RecordMutation {
            key,
            expected_version: expected_version.into(),
            update: RecordUpdate::Quantities {
                delta_on_hand,
                delta_reserved,
            },
        });
        self
    }

    pub fn thresholds(
        mut self,
        key: RecordKey,
        expected_version: impl Into<ExpectedVersion>,
        thresholds: StockThresholds,
    ) -> Self {
        self.mutations.push(RecordMutation {
            key,
            expected_version: expected_version.into(),
            update: RecordUpdate::Thresholds(thresholds),
        });
        self
    }

    pub fn movement(mut self, movement: NewMovement) -> Self {
        self.movements.push(movement);
        self
    }

    pub fn complete(mut self, pending: MovementId) -> Self {
        self.complete_pending.push(pending);
        self
    }

    pub fn insert_reservation(mut self, reservation: StockReservation) -> Self {
        self.reservation = Some(ReservationWrite {
            reservation,
            expected_status: None,
        });
        self
    }

    pub fn update_reservation(
        mut self,
        reservation: StockReservation,
        expected_status: ReservationStatus,
    ) -> Self {
        self.reservation = Some(ReservationWrite {
            reservation,
            expected_status: Some(expected_status),
        });
        self
    }

    pub fn new_batch(mut self, batch: StockBatch) -> Self {
        self.new_batches.push(batch);
        self
    }

    pub fn batch_delta(mut self, batch_id: BatchId, delta: i64) -> Self {
        self.batch_deltas.push((batch_id, delta));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create_records.is_empty()
            && self.mutations.is_empty()
            && self.movements.is_empty()
            && self.complete_pending.is_empty()
            && self.reservation.is_none()
            && self.new_batches.is_empty()
            && self.batch_deltas.is_empty()
    }
}

/// State written by a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    /// Final state of every created or mutated record, in key order.
    pub records: Vec<InventoryRecord>,
    /// Appended and completed ledger entries, in commit order.
    pub movements: Vec<StockMovement>,
    pub reservation: Option<StockReservation>,
    /// Created or changed batches.
    pub batches: Vec<StockBatch>,
}

impl Committed {
    pub fn record(&self, key: RecordKey) -> Option<&InventoryRecord> {
        self.records.iter().find(|r| r.key() == key)
    }
}

pub trait StockTransaction: Send + Sync {
    fn commit(&self, change: StockChange) -> Result<Committed, StoreError>;

    /// Quantity-only mutation with no ledger entry. Callers that need an audit
    /// trail build a [`StockChange`] instead.
    fn mutate(
        &self,
        key: RecordKey,
        delta_on_hand: i64,
        delta_reserved: i64,
        expected_version: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError> {
        let committed = self.commit(StockChange::new().adjust(
            key,
            expected_version,
            delta_on_hand,
            delta_reserved,
        ))?;
        committed
            .record(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("inventory record {key}")))
    }
}

pub trait InventoryRecordStore: Send + Sync {
    fn get(&self, key: RecordKey) -> Result<InventoryRecord, StoreError>;

    fn records_for_product(&self, product_id: ProductId)
    -> Result<Vec<InventoryRecord>, StoreError>;
}

pub trait LedgerStore: Send + Sync {
    /// Append a standalone entry that does not touch any record (`pending`,
    /// `cancelled` or `failed`). Completed entries only enter through a commit.
    fn append(
        &self,
        movement: NewMovement,
        status: MovementStatus,
    ) -> Result<StockMovement, StoreError>;

    /// Move a pending entry to `cancelled` or `failed`.
    fn transition(
        &self,
        movement_id: MovementId,
        status: MovementStatus,
    ) -> Result<StockMovement, StoreError>;

    fn movement(&self, movement_id: MovementId) -> Result<StockMovement, StoreError>;

    /// Newest first (`movement_date`, then append order).
    fn history(
        &self,
        product_id: ProductId,
        location_id: Option<LocationId>,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError>;

    /// Completed entries booked against `key`, oldest first.
    fn completed_movements(&self, key: RecordKey) -> Result<Vec<StockMovement>, StoreError>;
}

pub trait ReservationStore: Send + Sync {
    fn reservation(&self, id: ReservationId) -> Result<StockReservation, StoreError>;

    fn reservations_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StoreError>;

    fn active_for_record(&self, key: RecordKey) -> Result<Vec<StockReservation>, StoreError>;

    /// Active holds whose `expires_at` is before `now`.
    fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<StockReservation>, StoreError>;
}

pub trait AlertStore: Send + Sync {
    fn active_alerts(&self) -> Result<Vec<StockAlert>, StoreError>;

    fn alerts_for_record(&self, key: RecordKey) -> Result<Vec<StockAlert>, StoreError>;

    fn alert(&self, id: AlertId) -> Result<StockAlert, StoreError>;

    /// Evaluate the record's threshold alerts against its stored state and
    /// reconcile them in the same step, so a late caller can never write back
    /// an older view of the record.
    fn reconcile_record_alerts(&self, key: RecordKey)
    -> Result<AlertReconciliation, StoreError>;

    /// Same for the `expiring` alert of one stored batch.
    fn reconcile_batch_alerts(
        &self,
        batch_id: BatchId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<AlertReconciliation, StoreError>;

    fn acknowledge_alert(&self, id: AlertId, by: Option<UserId>)
    -> Result<StockAlert, StoreError>;
}

pub trait BatchStore: Send + Sync {
    fn batch(&self, id: BatchId) -> Result<StockBatch, StoreError>;

    fn batches_for_record(&self, key: RecordKey) -> Result<Vec<StockBatch>, StoreError>;

    /// Batches carrying an expiry date, depleted ones included.
    fn batches_with_expiry(&self) -> Result<Vec<StockBatch>, StoreError>;
}

/// Everything the services need from a backing store.
pub trait StockStore:
    InventoryRecordStore
    + LedgerStore
    + ReservationStore
    + AlertStore
    + BatchStore
    + StockTransaction
    + core::fmt::Debug
{
}

impl<T> StockStore for T where
    T: InventoryRecordStore
        + LedgerStore
        + ReservationStore
        + AlertStore
        + BatchStore
        + StockTransaction
        + core::fmt::Debug
{
}
