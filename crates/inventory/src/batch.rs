use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{BatchId, DomainError, DomainResult, LocationId, ProductId};

/// A received lot (e.g. one dye lot of porcelain tile, or a pallet of
/// adhesive with a shelf life).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    pub id: BatchId,
    pub batch_number: String,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub initial_quantity: i64,
    pub current_quantity: i64,
    pub unit_cost: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

impl StockBatch {
    pub fn receive(
        batch_number: impl Into<String>,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Option<i64>,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let batch_number = batch_number.into();
        if batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if quantity <= 0 {
            return Err(DomainError::validation("batch quantity must be positive"));
        }
        Ok(Self {
            id: BatchId::new(),
            batch_number,
            product_id,
            location_id,
            initial_quantity: quantity,
            current_quantity: quantity,
            unit_cost,
            expiry_date,
            received_at: now,
        })
    }

    /// Apply a signed change; the remaining quantity may not go negative or
    /// exceed what was received.
    pub fn apply_delta(&self, delta: i64) -> DomainResult<Self> {
        let next = self.current_quantity + delta;
        if next < 0 {
            return Err(DomainError::invalid_state(format!(
                "batch {} has {} left, cannot take {}",
                self.batch_number, self.current_quantity, -delta
            )));
        }
        if next > self.initial_quantity {
            return Err(DomainError::invalid_state(format!(
                "batch {} cannot exceed its received quantity {}",
                self.batch_number, self.initial_quantity
            )));
        }
        Ok(Self {
            current_quantity: next,
            ..self.clone()
        })
    }

    pub fn is_depleted(&self) -> bool {
        self.current_quantity == 0
    }
}
