use std::time::Duration;

use tracing::{debug, info, instrument};

use tilestock_core::{AggregateRoot, CartSessionId, LocationId, ProductId, ReservationId};
use tilestock_inventory::{
    MovementType, NewMovement, RecordKey, ReleaseCause, ReservationHolder, ReservationStatus,
    StockReservation,
};

use super::{AlertEvaluator, StockContext, chrono_duration};
use crate::error::StockError;
use crate::store::{Committed, StockChange};

/// Result of a release request. Releasing a terminal hold is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(StockReservation),
    AlreadyTerminal(StockReservation),
}

impl ReleaseOutcome {
    pub fn reservation(&self) -> &StockReservation {
        match self {
            ReleaseOutcome::Released(r) | ReleaseOutcome::AlreadyTerminal(r) => r,
        }
    }

    pub fn was_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released(_))
    }
}

enum ReleaseAttempt {
    Committed(Committed),
    Noop(StockReservation),
}

/// Owns the reservation state machine and is the only writer of
/// `quantity_reserved`.
#[derive(Debug, Clone)]
pub struct ReservationManager {
    ctx: StockContext,
    alerts: AlertEvaluator,
}

impl ReservationManager {
    pub fn new(ctx: StockContext, alerts: AlertEvaluator) -> Self {
        Self { ctx, alerts }
    }

    fn hold_window(&self, ttl: Option<Duration>) -> Result<chrono::Duration, StockError> {
        let ttl = ttl.unwrap_or(self.ctx.config.reservation_ttl);
        if ttl.is_zero() {
            return Err(StockError::validation("reservation ttl must be positive"));
        }
        if ttl > self.ctx.config.max_reservation_ttl {
            return Err(StockError::validation(format!(
                "reservation ttl {}s exceeds the maximum of {}s",
                ttl.as_secs(),
                self.ctx.config.max_reservation_ttl.as_secs()
            )));
        }
        chrono_duration(ttl)
    }

    /// Hold `quantity` units against the record's available stock.
    #[instrument(
        skip(self, holder),
        fields(product_id = %product_id, location_id = %location_id),
        err
    )]
    pub fn reserve(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        holder: ReservationHolder,
        ttl: Option<Duration>,
    ) -> Result<StockReservation, StockError> {
        if quantity <= 0 {
            return Err(StockError::validation("reservation quantity must be positive"));
        }
        let ttl = self.hold_window(ttl)?;
        let key = RecordKey::new(product_id, location_id);

        let committed = self.ctx.config.retry.run("reserve", |attempt| {
            let record = self.ctx.store.get(key)?;
            let available = record.quantity_available();
            if available < quantity {
                return Err(StockError::InsufficientStock {
                    requested: quantity,
                    available,
                });
            }

            let now = self.ctx.clock.now();
            let reservation = StockReservation::open(
                product_id,
                location_id,
                quantity,
                holder.clone(),
                ttl,
                now,
            )?;
            let movement =
                NewMovement::new(MovementType::Reservation, product_id, location_id, quantity)
                    .reservation(reservation.id)
                    .performed_by(holder.user_id)
                    .reason("reserved");

            debug!(attempt, version = record.version(), "committing reservation");
            Ok(self.ctx.store.commit(
                StockChange::new()
                    .adjust(key, record.version(), 0, quantity)
                    .movement(movement)
                    .insert_reservation(reservation),
            )?)
        })?;

        let reservation = committed.reservation.clone().ok_or_else(|| {
            StockError::TransactionFailure("commit returned no reservation".to_string())
        })?;
        self.after_commit(&committed);
        info!(
            reservation_id = %reservation.id,
            quantity,
            expires_at = %reservation.expires_at,
            "stock reserved"
        );
        Ok(reservation)
    }

    /// `active → confirmed`: the held units leave on-hand as a sale.
    ///
    /// A hold that is past its window but not yet swept is expired here and
    /// the call fails with `InvalidState`.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub fn confirm(&self, id: ReservationId) -> Result<StockReservation, StockError> {
        let current = self.ctx.store.reservation(id)?;
        if current.is_expired_at(self.ctx.clock.now()) {
            self.release(id, ReleaseCause::Expired)?;
            return Err(StockError::invalid_state(format!(
                "reservation {id} expired at {}",
                current.expires_at
            )));
        }

        let committed = self.ctx.config.retry.run("confirm", |_| {
            let reservation = self.ctx.store.reservation(id)?;
            let confirmed = reservation.confirm(self.ctx.clock.now())?;
            let key = reservation.key();
            let record = self.ctx.store.get(key)?;
            let sale = NewMovement::new(
                MovementType::Sale,
                reservation.product_id,
                reservation.location_id,
                -reservation.quantity,
            )
            .reservation(id)
            .performed_by(reservation.holder.user_id)
            .reason("checkout");

            Ok(self.ctx.store.commit(
                StockChange::new()
                    .adjust(
                        key,
                        record.version(),
                        -reservation.quantity,
                        -reservation.quantity,
                    )
                    .movement(sale)
                    .update_reservation(confirmed, ReservationStatus::Active),
            )?)
        })?;

        let confirmed = committed.reservation.clone().ok_or_else(|| {
            StockError::TransactionFailure("commit returned no reservation".to_string())
        })?;
        self.after_commit(&committed);
        info!(quantity = confirmed.quantity, "reservation confirmed");
        Ok(confirmed)
    }

    /// `active → released | expired`; a no-op for terminal holds.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub fn release(
        &self,
        id: ReservationId,
        cause: ReleaseCause,
    ) -> Result<ReleaseOutcome, StockError> {
        let attempt = self.ctx.config.retry.run("release", |_| {
            let reservation = self.ctx.store.reservation(id)?;
            let Some(released) = reservation.release(cause, self.ctx.clock.now()) else {
                return Ok(ReleaseAttempt::Noop(reservation));
            };
            let key = reservation.key();
            let record = self.ctx.store.get(key)?;
            let movement = NewMovement::new(
                MovementType::Release,
                reservation.product_id,
                reservation.location_id,
                -reservation.quantity,
            )
            .reservation(id)
            .reason(released.status.as_str());

            let committed = self.ctx.store.commit(
                StockChange::new()
                    .adjust(key, record.version(), 0, -reservation.quantity)
                    .movement(movement)
                    .update_reservation(released, ReservationStatus::Active),
            )?;
            Ok(ReleaseAttempt::Committed(committed))
        })?;

        match attempt {
            ReleaseAttempt::Noop(current) => {
                debug!(status = current.status.as_str(), "reservation already terminal");
                Ok(ReleaseOutcome::AlreadyTerminal(current))
            }
            ReleaseAttempt::Committed(committed) => {
                let released = committed.reservation.clone().ok_or_else(|| {
                    StockError::TransactionFailure("commit returned no reservation".to_string())
                })?;
                self.after_commit(&committed);
                info!(
                    status = released.status.as_str(),
                    quantity = released.quantity,
                    "reservation released"
                );
                Ok(ReleaseOutcome::Released(released))
            }
        }
    }

    /// Expire the session's stale holds and return the ones still active.
    /// Calling it twice yields the same set.
    #[instrument(skip(self), fields(session = %session), err)]
    pub fn sync_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StockError> {
        let now = self.ctx.clock.now();
        let mut surviving = Vec::new();
        for reservation in self.ctx.store.reservations_for_session(session)? {
            if !reservation.is_active() {
                continue;
            }
            if reservation.is_expired_at(now) {
                self.release(reservation.id, ReleaseCause::Expired)?;
            } else {
                surviving.push(reservation);
            }
        }
        Ok(surviving)
    }

    pub fn reservation(&self, id: ReservationId) -> Result<StockReservation, StockError> {
        Ok(self.ctx.store.reservation(id)?)
    }

    /// Every hold ever taken by the session, oldest first.
    pub fn reservations_for_session(
        &self,
        session: &CartSessionId,
    ) -> Result<Vec<StockReservation>, StockError> {
        Ok(self.ctx.store.reservations_for_session(session)?)
    }

    fn after_commit(&self, committed: &Committed) {
        self.ctx.announce(committed);
        self.alerts.after_commit(&committed.records, &[]);
    }
}
