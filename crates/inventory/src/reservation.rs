//! Reservation hold state machine.
//!
//! ```text
//! (none) ──reserve──▶ active ──confirm──▶ confirmed
//!                       │
//!                       ├──release(cause=released)──▶ released
//!                       └──release(cause=expired)───▶ expired
//! ```
//!
//! Terminal states never transition again. Releasing a terminal hold is a
//! no-op so that timers, manual syncs and cart removals can race freely.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{
    CartSessionId, DomainError, DomainResult, LocationId, OrderId, ProductId, ReservationId,
    UserId,
};

use crate::record::RecordKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }
}

/// Why a hold is being let go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCause {
    /// Cart removal or cancellation.
    Released,
    /// Hold window elapsed.
    Expired,
}

impl ReleaseCause {
    pub fn target_status(self) -> ReservationStatus {
        match self {
            ReleaseCause::Released => ReservationStatus::Released,
            ReleaseCause::Expired => ReservationStatus::Expired,
        }
    }
}

/// Who the hold is for. At least one of session, order or user must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHolder {
    pub cart_session_id: Option<CartSessionId>,
    pub order_id: Option<OrderId>,
    pub user_id: Option<UserId>,
    /// Price shown to the shopper when the hold was taken (cents).
    pub unit_price: Option<i64>,
}

impl ReservationHolder {
    pub fn cart(session: CartSessionId) -> Self {
        Self {
            cart_session_id: Some(session),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_order(mut self, order_id: Option<OrderId>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_unit_price(mut self, unit_price: Option<i64>) -> Self {
        self.unit_price = unit_price;
        self
    }

    fn is_anonymous(&self) -> bool {
        self.cart_session_id.is_none() && self.order_id.is_none() && self.user_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    #[serde(flatten)]
    pub holder: ReservationHolder,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl StockReservation {
    /// Open a new `active` hold.
    pub fn open(
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        holder: ReservationHolder,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        if ttl <= Duration::zero() {
            return Err(DomainError::validation("reservation ttl must be positive"));
        }
        if holder.is_anonymous() {
            return Err(DomainError::validation(
                "reservation needs a cart session, order or user",
            ));
        }
        if matches!(holder.unit_price, Some(p) if p < 0) {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        Ok(Self {
            id: ReservationId::new(),
            product_id,
            location_id,
            quantity,
            holder,
            status: ReservationStatus::Active,
            reserved_at: now,
            expires_at: now + ttl,
            released_at: None,
            confirmed_at: None,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.product_id, self.location_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Active and past its hold window.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }

    pub fn belongs_to_session(&self, session: &CartSessionId) -> bool {
        self.holder.cart_session_id.as_ref() == Some(session)
    }

    /// `active → confirmed`. Expired or terminal holds are `InvalidState`.
    pub fn confirm(&self, now: DateTime<Utc>) -> DomainResult<Self> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "reservation {} is {}, not active",
                self.id,
                self.status.as_str()
            )));
        }
        if self.is_expired_at(now) {
            return Err(DomainError::invalid_state(format!(
                "reservation {} expired at {}",
                self.id, self.expires_at
            )));
        }
        Ok(Self {
            status: ReservationStatus::Confirmed,
            confirmed_at: Some(now),
            ..self.clone()
        })
    }

    /// `active → released | expired`.
    ///
    /// Returns `None` when the hold is already terminal: the caller treats
    /// that as a successful no-op.
    pub fn release(&self, cause: ReleaseCause, now: DateTime<Utc>) -> Option<Self> {
        if self.status.is_terminal() {
            return None;
        }
        Some(Self {
            status: cause.target_status(),
            released_at: Some(now),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder() -> ReservationHolder {
        ReservationHolder::cart(CartSessionId::new("cart-1").unwrap())
    }

    fn open(now: DateTime<Utc>) -> StockReservation {
        StockReservation::open(
            ProductId::new(),
            LocationId::new(),
            3,
            holder(),
            Duration::minutes(15),
            now,
        )
        .unwrap()
    }

    #[test]
    fn open_sets_expiry_from_ttl() {
        let now = Utc::now();
        let r = open(now);
        assert_eq!(r.status, ReservationStatus::Active);
        assert_eq!(r.expires_at, now + Duration::minutes(15));
    }

    #[test]
    fn open_rejects_bad_input() {
        let now = Utc::now();
        let p = ProductId::new();
        let l = LocationId::new();
        let ttl = Duration::minutes(1);
        assert!(StockReservation::open(p, l, 0, holder(), ttl, now).is_err());
        assert!(StockReservation::open(p, l, 1, holder(), Duration::zero(), now).is_err());
        assert!(
            StockReservation::open(p, l, 1, ReservationHolder::default(), ttl, now).is_err()
        );
    }

    #[test]
    fn confirm_is_only_valid_from_active() {
        let now = Utc::now();
        let confirmed = open(now).confirm(now).unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert!(matches!(
            confirmed.confirm(now),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn confirm_after_expiry_is_invalid_state() {
        let now = Utc::now();
        let r = open(now);
        let later = now + Duration::minutes(16);
        assert!(r.is_expired_at(later));
        assert!(matches!(r.confirm(later), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn release_is_a_noop_once_terminal() {
        let now = Utc::now();
        let released = open(now).release(ReleaseCause::Released, now).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
        assert!(released.release(ReleaseCause::Expired, now).is_none());

        let confirmed = open(now).confirm(now).unwrap();
        assert!(confirmed.release(ReleaseCause::Released, now).is_none());
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let now = Utc::now();
        let r = open(now);
        assert!(!r.is_expired_at(r.expires_at));
        assert!(r.is_expired_at(r.expires_at + Duration::milliseconds(1)));
    }
}
