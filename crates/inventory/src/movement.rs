use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{
    BatchId, DomainError, DomainResult, LocationId, MovementId, ProductId, ReservationId, UserId,
};

/// Kind of quantity change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Return,
    Adjustment,
    TransferIn,
    TransferOut,
    Damage,
    CountAdjustment,
    Reservation,
    Release,
}

/// Which way a movement type is allowed to move quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Either,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Adjustment => "adjustment",
            MovementType::TransferIn => "transfer_in",
            MovementType::TransferOut => "transfer_out",
            MovementType::Damage => "damage",
            MovementType::CountAdjustment => "count_adjustment",
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            MovementType::Purchase
            | MovementType::Return
            | MovementType::TransferIn
            | MovementType::Reservation => Direction::Inbound,
            MovementType::Sale
            | MovementType::TransferOut
            | MovementType::Damage
            | MovementType::Release => Direction::Outbound,
            MovementType::Adjustment | MovementType::CountAdjustment => Direction::Either,
        }
    }

    /// Whether the movement's quantity is an on-hand change.
    ///
    /// `reservation` and `release` record changes to the reserved quantity;
    /// on-hand is untouched by them.
    pub fn affects_on_hand(self) -> bool {
        !matches!(self, MovementType::Reservation | MovementType::Release)
    }

    /// Types callers may request through the adjustment entry point.
    pub fn is_manual(self) -> bool {
        matches!(
            self,
            MovementType::Purchase
                | MovementType::Sale
                | MovementType::Return
                | MovementType::Adjustment
                | MovementType::Damage
        )
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "purchase" => MovementType::Purchase,
            "sale" => MovementType::Sale,
            "return" => MovementType::Return,
            "adjustment" => MovementType::Adjustment,
            "transfer_in" => MovementType::TransferIn,
            "transfer_out" => MovementType::TransferOut,
            "damage" => MovementType::Damage,
            "count_adjustment" => MovementType::CountAdjustment,
            "reservation" => MovementType::Reservation,
            "release" => MovementType::Release,
            other => {
                return Err(DomainError::validation(format!(
                    "unknown movement type '{other}'"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

impl MovementStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MovementStatus::Pending)
    }
}

/// Ledger entry (immutable once terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    /// Global append position; breaks ties between equal `movement_date`s.
    pub sequence: u64,
    pub movement_type: MovementType,
    pub product_id: ProductId,
    /// The record this entry is booked against.
    pub location_id: LocationId,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    /// Signed; positive adds to the record.
    pub quantity: i64,
    /// Smallest currency unit (cents).
    pub unit_cost: Option<i64>,
    pub status: MovementStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<UserId>,
    pub reservation_id: Option<ReservationId>,
    pub batch_id: Option<BatchId>,
    pub movement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockMovement {
    /// Quantity contribution to on-hand when replaying completed entries.
    pub fn on_hand_delta(&self) -> i64 {
        if self.status == MovementStatus::Completed && self.movement_type.affects_on_hand() {
            self.quantity
        } else {
            0
        }
    }

    /// Move a pending entry to a terminal status.
    pub fn transition(&self, status: MovementStatus, now: DateTime<Utc>) -> DomainResult<Self> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "movement {} is already {:?}",
                self.id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(DomainError::validation("target status must be terminal"));
        }
        Ok(Self {
            status,
            updated_at: now,
            ..self.clone()
        })
    }
}

/// A movement that has not been appended yet (no id, no sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub quantity: i64,
    pub unit_cost: Option<i64>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<UserId>,
    pub reservation_id: Option<ReservationId>,
    pub batch_id: Option<BatchId>,
    pub movement_date: Option<DateTime<Utc>>,
}

impl NewMovement {
    /// Inbound entries default `to_location_id`, outbound ones `from_location_id`.
    pub fn new(
        movement_type: MovementType,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
    ) -> Self {
        let (from, to) = if quantity >= 0 {
            (None, Some(location_id))
        } else {
            (Some(location_id), None)
        };
        Self {
            movement_type,
            product_id,
            location_id,
            from_location_id: from,
            to_location_id: to,
            quantity,
            unit_cost: None,
            reason: None,
            notes: None,
            performed_by: None,
            reservation_id: None,
            batch_id: None,
            movement_date: None,
        }
    }

    pub fn between(mut self, from: LocationId, to: LocationId) -> Self {
        self.from_location_id = Some(from);
        self.to_location_id = Some(to);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn performed_by(mut self, actor: Option<UserId>) -> Self {
        self.performed_by = actor;
        self
    }

    pub fn unit_cost(mut self, unit_cost: Option<i64>) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn reservation(mut self, reservation_id: ReservationId) -> Self {
        self.reservation_id = Some(reservation_id);
        self
    }

    pub fn batch(mut self, batch_id: Option<BatchId>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn dated(mut self, movement_date: DateTime<Utc>) -> Self {
        self.movement_date = Some(movement_date);
        self
    }

    /// Zero quantities and sign/type mismatches are rejected.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity == 0 {
            return Err(DomainError::validation("movement quantity cannot be zero"));
        }
        match (self.movement_type.direction(), self.quantity > 0) {
            (Direction::Inbound, false) => Err(DomainError::validation(format!(
                "{} movements must be positive",
                self.movement_type
            ))),
            (Direction::Outbound, true) => Err(DomainError::validation(format!(
                "{} movements must be negative",
                self.movement_type
            ))),
            _ => Ok(()),
        }
    }

    /// Materialize as a stored entry.
    pub fn into_movement(
        self,
        sequence: u64,
        status: MovementStatus,
        now: DateTime<Utc>,
    ) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            sequence,
            movement_type: self.movement_type,
            product_id: self.product_id,
            location_id: self.location_id,
            from_location_id: self.from_location_id,
            to_location_id: self.to_location_id,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            status,
            reason: self.reason,
            notes: self.notes,
            performed_by: self.performed_by,
            reservation_id: self.reservation_id,
            batch_id: self.batch_id,
            movement_date: self.movement_date.unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }
}
