use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{AlertId, LocationId, ProductId, ReservationId};
use tilestock_events::Event;

use crate::alert::{AlertSeverity, AlertType, StockAlert};
use crate::record::{InventoryRecord, RecordKey, StockLevels};
use crate::reservation::{ReservationStatus, StockReservation};

/// Post-commit change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockEvent {
    RecordChanged {
        product_id: ProductId,
        location_id: LocationId,
        levels: StockLevels,
        version: u64,
        occurred_at: DateTime<Utc>,
    },
    ReservationChanged {
        reservation_id: ReservationId,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        status: ReservationStatus,
        occurred_at: DateTime<Utc>,
    },
    AlertRaised {
        alert_id: AlertId,
        product_id: ProductId,
        location_id: LocationId,
        alert_type: AlertType,
        severity: AlertSeverity,
        occurred_at: DateTime<Utc>,
    },
    AlertResolved {
        alert_id: AlertId,
        product_id: ProductId,
        location_id: LocationId,
        alert_type: AlertType,
        occurred_at: DateTime<Utc>,
    },
}

impl StockEvent {
    pub fn record_changed(record: &InventoryRecord) -> Self {
        StockEvent::RecordChanged {
            product_id: record.product_id(),
            location_id: record.location_id(),
            levels: record.levels(),
            version: tilestock_core::AggregateRoot::version(record),
            occurred_at: record.updated_at(),
        }
    }

    pub fn reservation_changed(reservation: &StockReservation, at: DateTime<Utc>) -> Self {
        StockEvent::ReservationChanged {
            reservation_id: reservation.id,
            product_id: reservation.product_id,
            location_id: reservation.location_id,
            quantity: reservation.quantity,
            status: reservation.status,
            occurred_at: at,
        }
    }

    pub fn alert_raised(alert: &StockAlert) -> Self {
        StockEvent::AlertRaised {
            alert_id: alert.id,
            product_id: alert.product_id,
            location_id: alert.location_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            occurred_at: alert.updated_at,
        }
    }

    pub fn alert_resolved(alert: &StockAlert) -> Self {
        StockEvent::AlertResolved {
            alert_id: alert.id,
            product_id: alert.product_id,
            location_id: alert.location_id,
            alert_type: alert.alert_type,
            occurred_at: alert.updated_at,
        }
    }

    /// The `(product, location)` stream this event belongs to.
    pub fn stream(&self) -> RecordKey {
        match self {
            StockEvent::RecordChanged {
                product_id,
                location_id,
                ..
            }
            | StockEvent::ReservationChanged {
                product_id,
                location_id,
                ..
            }
            | StockEvent::AlertRaised {
                product_id,
                location_id,
                ..
            }
            | StockEvent::AlertResolved {
                product_id,
                location_id,
                ..
            } => RecordKey::new(*product_id, *location_id),
        }
    }

    /// Record version for `RecordChanged`, 0 otherwise.
    pub fn sequence(&self) -> u64 {
        match self {
            StockEvent::RecordChanged { version, .. } => *version,
            _ => 0,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::RecordChanged { .. } => "stock.record.changed",
            StockEvent::ReservationChanged { .. } => "stock.reservation.changed",
            StockEvent::AlertRaised { .. } => "stock.alert.raised",
            StockEvent::AlertResolved { .. } => "stock.alert.resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::RecordChanged { occurred_at, .. }
            | StockEvent::ReservationChanged { occurred_at, .. }
            | StockEvent::AlertRaised { occurred_at, .. }
            | StockEvent::AlertResolved { occurred_at, .. } => *occurred_at,
        }
    }
}
