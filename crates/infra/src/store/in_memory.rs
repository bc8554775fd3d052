use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use tilestock_core::{
    AggregateRoot, AlertId, BatchId, CartSessionId, DomainError, ExpectedVersion, LocationId,
    MovementId, ProductId, ReservationId, UserId,
};
use tilestock_inventory::{
    AlertCondition, AlertReconciliation, AlertScope, InventoryRecord, MovementStatus,
    NewMovement, RecordKey, StockAlert, StockBatch, StockMovement, StockReservation, evaluate,
    evaluate_batch, reconcile,
};

use super::{
    AlertStore, BatchStore, Committed, InventoryRecordStore, LedgerStore, RecordUpdate,
    ReservationStore, StockChange, StockTransaction,
};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<RecordKey, InventoryRecord>,
    /// Append order; `sequence` is the index + 1.
    movements: Vec<StockMovement>,
    movement_index: HashMap<MovementId, usize>,
    reservations: BTreeMap<ReservationId, StockReservation>,
    alerts: BTreeMap<AlertId, StockAlert>,
    batches: BTreeMap<BatchId, StockBatch>,
    next_sequence: u64,
}

impl State {
    fn has_record(
        &self,
        key: &RecordKey,
        staged: &BTreeMap<RecordKey, InventoryRecord>,
    ) -> bool {
        staged.contains_key(key) || self.records.contains_key(key)
    }

    fn push_movement(
        &mut self,
        movement: NewMovement,
        status: MovementStatus,
        now: DateTime<Utc>,
    ) -> StockMovement {
        self.next_sequence += 1;
        let stored = movement.into_movement(self.next_sequence, status, now);
        self.movement_index.insert(stored.id, self.movements.len());
        self.movements.push(stored.clone());
        stored
    }

    fn reconcile_alerts(
        &mut self,
        key: RecordKey,
        scope: AlertScope,
        conditions: Vec<AlertCondition>,
        now: DateTime<Utc>,
    ) -> AlertReconciliation {
        let existing: Vec<StockAlert> = self
            .alerts
            .values()
            .filter(|a| a.is_active && a.key() == key)
            .cloned()
            .collect();

        let outcome = reconcile(&existing, key, scope, conditions, now);
        for alert in outcome.writes() {
            self.alerts.insert(alert.id, alert.clone());
        }
        outcome
    }
}

/// In-memory transactional stock store.
///
/// A single lock guards every table, so a commit is trivially serializable:
/// it validates the whole change set against the current state first and
/// only then writes. Intended for tests/dev and single-process deployments.
#[derive(Debug)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Transaction("stock store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Transaction("stock store lock poisoned".to_string()))
    }
}

fn rejected(err: DomainError) -> StoreError {
    match err {
        DomainError::InvalidState(msg) => StoreError::InvalidState(msg),
        other => StoreError::InvalidState(other.to_string()),
    }
}

fn record_not_found(key: RecordKey) -> StoreError {
    StoreError::NotFound(format!("inventory record {key}"))
}

impl StockTransaction for InMemoryStockStore {
    fn commit(&self, change: StockChange) -> Result<Committed, StoreError> {
        let now = self.clock.now();
        let mut guard = self.write()?;
        let state = &mut *guard;

        // Stage: nothing below touches `state` until every check has passed.
        let mut staged: BTreeMap<RecordKey, InventoryRecord> = BTreeMap::new();
        for record in change.create_records {
            let key = record.key();
            if state.has_record(&key, &staged) {
                return Err(StoreError::Duplicate(format!(
                    "inventory record {key} already exists"
                )));
            }
            staged.insert(key, record);
        }

        // Status CAS first: a hold released by someone else must surface as a
        // conflict, not as the negative quantity its stale delta would produce.
        if let Some(write) = &change.reservation {
            let id = write.reservation.id;
            match (write.expected_status, state.reservations.get(&id)) {
                (None, Some(_)) => {
                    return Err(StoreError::Duplicate(format!("reservation {id}")));
                }
                (None, None) => {}
                (Some(_), None) => {
                    return Err(StoreError::NotFound(format!("reservation {id}")));
                }
                (Some(expected), Some(current)) if current.status != expected => {
                    return Err(StoreError::ReservationConflict {
                        id: id.to_string(),
                        expected,
                        actual: current.status,
                    });
                }
                (Some(_), Some(_)) => {}
            }
        }

        let mut version_checked = BTreeSet::new();
        for mutation in &change.mutations {
            let current = match staged.get(&mutation.key) {
                Some(r) => r.clone(),
                None => state
                    .records
                    .get(&mutation.key)
                    .cloned()
                    .ok_or_else(|| record_not_found(mutation.key))?,
            };

            // Later mutations of the same key in one change build on the first.
            if version_checked.insert(mutation.key)
                && !mutation.expected_version.matches(current.version())
            {
                let expected = match mutation.expected_version {
                    ExpectedVersion::Exact(v) => v,
                    ExpectedVersion::Any => current.version(),
                };
                return Err(StoreError::VersionConflict {
                    key: mutation.key.to_string(),
                    expected,
                    actual: current.version(),
                });
            }

            let next = match &mutation.update {
                RecordUpdate::Quantities {
                    delta_on_hand,
                    delta_reserved,
                } => current.apply_delta(*delta_on_hand, *delta_reserved, now),
                RecordUpdate::Thresholds(thresholds) => current.with_thresholds(*thresholds, now),
            }
            .map_err(rejected)?;
            staged.insert(mutation.key, next);
        }

        let mut completions = Vec::with_capacity(change.complete_pending.len());
        for id in &change.complete_pending {
            let idx = *state
                .movement_index
                .get(id)
                .ok_or_else(|| StoreError::NotFound(format!("movement {id}")))?;
            let completed = state.movements[idx]
                .transition(MovementStatus::Completed, now)
                .map_err(rejected)?;
            completions.push((idx, completed));
        }

        for movement in &change.movements {
            movement.validate().map_err(rejected)?;
            let key = RecordKey::new(movement.product_id, movement.location_id);
            if !state.has_record(&key, &staged) {
                return Err(record_not_found(key));
            }
        }

        let mut staged_batches: BTreeMap<BatchId, StockBatch> = BTreeMap::new();
        for batch in change.new_batches {
            let key = RecordKey::new(batch.product_id, batch.location_id);
            if !state.has_record(&key, &staged) {
                return Err(record_not_found(key));
            }
            let clash = state
                .batches
                .values()
                .chain(staged_batches.values())
                .any(|b| {
                    b.id == batch.id
                        || (b.batch_number == batch.batch_number
                            && b.product_id == batch.product_id
                            && b.location_id == batch.location_id)
                });
            if clash {
                return Err(StoreError::Duplicate(format!(
                    "batch {} at {key}",
                    batch.batch_number
                )));
            }
            staged_batches.insert(batch.id, batch);
        }
        for (id, delta) in &change.batch_deltas {
            let current = match staged_batches.get(id) {
                Some(b) => b.clone(),
                None => state
                    .batches
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))?,
            };
            staged_batches.insert(*id, current.apply_delta(*delta).map_err(rejected)?);
        }

        // Apply.
        let mut committed = Committed::default();
        for (key, record) in staged {
            state.records.insert(key, record.clone());
            committed.records.push(record);
        }
        for (idx, completed) in completions {
            state.movements[idx] = completed.clone();
            committed.movements.push(completed);
        }
        for movement in change.movements {
            let stored = state.push_movement(movement, MovementStatus::Completed, now);
            committed.movements.push(stored);
        }
        if let Some(write) = change.reservation {
            state
                .reservations
                .insert(write.reservation.id, write.reservation.clone());
            committed.reservation = Some(write.reservation);
        }
        for (id, batch) in staged_batches {
            state.batches.insert(id, batch.clone());
            committed.batches.push(batch);
        }

        Ok(committed)
    }
}

impl InventoryRecordStore for InMemoryStockStore {
    fn get(&self, key: RecordKey) -> Result<InventoryRecord, StoreError> {
        self.read()?
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| record_not_found(key))
    }

    fn records_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| r.product_id() == product_id)
            .cloned()
            .collect())
    }
}

impl LedgerStore for InMemoryStockStore {
    fn append(
        &self,
        movement: NewMovement,
        status: MovementStatus,
    ) -> Result<StockMovement, StoreError> {
        if status == MovementStatus::Completed {
            return Err(StoreError::InvalidState(
                "completed movements are only written together with their record change"
                    .to_string(),
            ));
        }
        movement.validate().map_err(rejected)?;

        let now = self.clock.now();
        let mut state = self.write()?;
        let key = RecordKey::new(movement.product_id, movement.location_id);
        if !state.records.contains_key(&key) {
            return Err(record_not_found(key));
        }
        Ok(state.push_movement(movement, status, now))
    }

    fn transition(
        &self,
        movement_id: MovementId,
        status: MovementStatus,
    ) -> Result<StockMovement, StoreError> {
        if status == MovementStatus::Completed {
            return Err(StoreError::InvalidState(
                "pending movements complete together with their record change".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut state = self.write()?;
        let idx = *state
            .movement_index
            .get(&movement_id)
            .ok_or_else(|| StoreError::NotFound(format!("movement {movement_id}")))?;
        let next = state.movements[idx]
            .transition(status, now)
            .map_err(rejected)?;
        state.movements[idx] = next.clone();
        Ok(next)
    }

    fn movement(&self, movement_id: MovementId) -> Result<StockMovement, StoreError> {
        let state = self.read()?;
        state
            .movement_index
            .get(&movement_id)
            .map(|&idx| state.movements[idx].clone())
            .ok_or_else(|| StoreError::NotFound(format!("movement {movement_id}")))
    }

    fn history(
        &self,
        product_id: ProductId,
        location_id: Option<LocationId>,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .filter(|m| location_id.is_none_or(|l| m.location_id == l))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.movement_date
                .cmp(&a.movement_date)
                .then(b.sequence.cmp(&a.sequence))
        });
        out.truncate(limit);
        Ok(out)
    }

    fn completed_movements(&self, key: RecordKey) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self
            .read()?
            .movements
            .iter()
            .filter(|m| {
                m.status == MovementStatus::Completed
                    && m.product_id == key.product_id
                    && m.location_id == key.location_id
            })
            .cloned()
            .collect())
    }
}

impl ReservationStore for InMemoryStockStore {
    fn reservation(&self, id: ReservationId) -> Result<StockReservation, StoreError> {
        self.read()?
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))
    }

    fn reservations_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StoreError> {
        let mut out: Vec<StockReservation> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.belongs_to_session(session))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.reserved_at);
        Ok(out)
    }

    fn active_for_record(&self, key: RecordKey) -> Result<Vec<StockReservation>, StoreError> {
        Ok(self
            .read()?
            .reservations
            .values()
            .filter(|r| r.is_active() && r.key() == key)
            .cloned()
            .collect())
    }

    fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<StockReservation>, StoreError> {
        let mut out: Vec<StockReservation> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.expires_at);
        Ok(out)
    }
}

impl AlertStore for InMemoryStockStore {
    fn active_alerts(&self) -> Result<Vec<StockAlert>, StoreError> {
        let mut out: Vec<StockAlert> = self
            .read()?
            .alerts
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    fn alerts_for_record(&self, key: RecordKey) -> Result<Vec<StockAlert>, StoreError> {
        Ok(self
            .read()?
            .alerts
            .values()
            .filter(|a| a.key() == key)
            .cloned()
            .collect())
    }

    fn alert(&self, id: AlertId) -> Result<StockAlert, StoreError> {
        self.read()?
            .alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))
    }

    fn reconcile_record_alerts(
        &self,
        key: RecordKey,
    ) -> Result<AlertReconciliation, StoreError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        let conditions = evaluate(state.records.get(&key).ok_or_else(|| record_not_found(key))?);
        Ok(state.reconcile_alerts(key, AlertScope::Thresholds, conditions, now))
    }

    fn reconcile_batch_alerts(
        &self,
        batch_id: BatchId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<AlertReconciliation, StoreError> {
        let stamped = self.clock.now();
        let mut state = self.write()?;
        let batch = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
        let key = RecordKey::new(batch.product_id, batch.location_id);
        let conditions = evaluate_batch(batch, now, window).into_iter().collect();
        Ok(state.reconcile_alerts(key, AlertScope::Batch(batch_id), conditions, stamped))
    }

    fn acknowledge_alert(
        &self,
        id: AlertId,
        by: Option<UserId>,
    ) -> Result<StockAlert, StoreError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        let alert = state
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        alert.acknowledge(by, now).map_err(rejected)?;
        Ok(alert.clone())
    }
}

impl BatchStore for InMemoryStockStore {
    fn batch(&self, id: BatchId) -> Result<StockBatch, StoreError> {
        self.read()?
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))
    }

    fn batches_for_record(&self, key: RecordKey) -> Result<Vec<StockBatch>, StoreError> {
        let mut out: Vec<StockBatch> = self
            .read()?
            .batches
            .values()
            .filter(|b| b.product_id == key.product_id && b.location_id == key.location_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.received_at);
        Ok(out)
    }

    fn batches_with_expiry(&self) -> Result<Vec<StockBatch>, StoreError> {
        Ok(self
            .read()?
            .batches
            .values()
            .filter(|b| b.expiry_date.is_some())
            .cloned()
            .collect())
    }
}
