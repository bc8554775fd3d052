use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tilestock_core::{BatchId, LocationId, OrderId, ProductId, UserId};
use tilestock_infra::{LedgerAudit, ReleaseOutcome, StockAdjustment};
use tilestock_inventory::{InventoryRecord, MovementType, StockThresholds};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StockLocationRequest {
    pub initial_quantity: i64,
    pub reorder_point: Option<i64>,
    pub reorder_quantity: Option<i64>,
    pub max_stock_level: Option<i64>,
    pub actor: Option<UserId>,
}

impl StockLocationRequest {
    pub fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            reorder_point: self.reorder_point,
            reorder_quantity: self.reorder_quantity,
            max_stock_level: self.max_stock_level,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    pub reason: String,
    /// Defaults to `adjustment`.
    pub movement_type: Option<MovementType>,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
    pub unit_cost: Option<i64>,
    pub batch_id: Option<BatchId>,
}

impl AdjustStockRequest {
    pub fn into_adjustment(self, product_id: ProductId, location_id: LocationId) -> StockAdjustment {
        StockAdjustment::new(product_id, location_id, self.delta, self.reason)
            .kind(self.movement_type.unwrap_or(MovementType::Adjustment))
            .actor(self.actor)
            .notes(self.notes)
            .unit_cost(self.unit_cost)
            .batch(self.batch_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    pub counted: i64,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from: LocationId,
    pub to: LocationId,
    pub quantity: i64,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveBatchRequest {
    pub batch_number: String,
    pub quantity: i64,
    pub unit_cost: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct PendingMovementRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub reason: String,
    /// Defaults to `purchase`.
    pub movement_type: Option<MovementType>,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
    pub unit_cost: Option<i64>,
}

impl PendingMovementRequest {
    pub fn into_adjustment(self) -> StockAdjustment {
        StockAdjustment::new(self.product_id, self.location_id, self.quantity, self.reason)
            .kind(self.movement_type.unwrap_or(MovementType::Purchase))
            .actor(self.actor)
            .notes(self.notes)
            .unit_cost(self.unit_cost)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub session_id: String,
    pub ttl_secs: Option<u64>,
    pub user_id: Option<UserId>,
    pub order_id: Option<OrderId>,
    pub unit_price: Option<i64>,
}

impl ReserveRequest {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeRequest {
    pub actor: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub location: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn record_to_json(record: &InventoryRecord) -> serde_json::Value {
    let thresholds = record.thresholds();
    serde_json::json!({
        "product_id": record.product_id(),
        "location_id": record.location_id(),
        "quantity_on_hand": record.quantity_on_hand(),
        "quantity_reserved": record.quantity_reserved(),
        "quantity_available": record.quantity_available(),
        "reorder_point": thresholds.reorder_point,
        "reorder_quantity": thresholds.reorder_quantity,
        "max_stock_level": thresholds.max_stock_level,
        "version": tilestock_core::AggregateRoot::version(record),
        "updated_at": record.updated_at(),
    })
}

pub fn release_to_json(outcome: &ReleaseOutcome) -> serde_json::Value {
    serde_json::json!({
        "released": outcome.was_released(),
        "reservation": outcome.reservation(),
    })
}

pub fn audit_to_json(audit: &LedgerAudit) -> serde_json::Value {
    serde_json::json!({
        "product_id": audit.key.product_id,
        "location_id": audit.key.location_id,
        "on_hand": audit.on_hand,
        "replayed": audit.replayed,
        "movements": audit.movements,
        "consistent": audit.is_consistent(),
    })
}
