use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{AggregateRoot, DomainError, DomainResult, LocationId, ProductId};

/// Identity of an inventory record: one row per (product, location).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl RecordKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// Optional reorder / overstock thresholds for a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub reorder_point: Option<i64>,
    pub reorder_quantity: Option<i64>,
    pub max_stock_level: Option<i64>,
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        for (name, value) in [
            ("reorder_point", self.reorder_point),
            ("reorder_quantity", self.reorder_quantity),
            ("max_stock_level", self.max_stock_level),
        ] {
            if matches!(value, Some(v) if v < 0) {
                return Err(DomainError::validation(format!("{name} cannot be negative")));
            }
        }

        if let (Some(reorder), Some(max)) = (self.reorder_point, self.max_stock_level) {
            if max < reorder {
                return Err(DomainError::validation(
                    "max_stock_level cannot be below reorder_point",
                ));
            }
        }

        Ok(())
    }
}

/// On-hand / reserved / available snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
}

impl core::ops::Add for StockLevels {
    type Output = StockLevels;

    fn add(self, rhs: Self) -> Self::Output {
        StockLevels {
            on_hand: self.on_hand + rhs.on_hand,
            reserved: self.reserved + rhs.reserved,
            available: self.available + rhs.available,
        }
    }
}

impl core::iter::Sum for StockLevels {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(StockLevels::default(), |acc, l| acc + l)
    }
}

/// Aggregate root: InventoryRecord.
///
/// A materialized projection of the movement ledger for one (product,
/// location). Quantities are only changed through [`InventoryRecord::apply_delta`],
/// which enforces `0 <= reserved <= on_hand` and bumps `version` by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    key: RecordKey,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    thresholds: StockThresholds,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// A freshly stocked location: zero quantities, version 0.
    pub fn new(
        product_id: ProductId,
        location_id: LocationId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            key: RecordKey::new(product_id, location_id),
            quantity_on_hand: 0,
            quantity_reserved: 0,
            thresholds,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    /// Derived; never stored independently.
    pub fn quantity_available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn thresholds(&self) -> &StockThresholds {
        &self.thresholds
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels {
            on_hand: self.quantity_on_hand,
            reserved: self.quantity_reserved,
            available: self.quantity_available(),
        }
    }

    /// Compute the successor state for a quantity change.
    ///
    /// Pure: the caller decides whether to persist the result (under a version
    /// check). Fails with `InvalidState` when either quantity would go negative
    /// or reserved would exceed on-hand.
    pub fn apply_delta(
        &self,
        delta_on_hand: i64,
        delta_reserved: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let on_hand = self
            .quantity_on_hand
            .checked_add(delta_on_hand)
            .ok_or_else(|| DomainError::invalid_state("on-hand quantity overflow"))?;
        let reserved = self
            .quantity_reserved
            .checked_add(delta_reserved)
            .ok_or_else(|| DomainError::invalid_state("reserved quantity overflow"))?;

        if on_hand < 0 {
            return Err(DomainError::invalid_state(format!(
                "on-hand quantity cannot go negative ({} {:+})",
                self.quantity_on_hand, delta_on_hand
            )));
        }
        if reserved < 0 {
            return Err(DomainError::invalid_state(format!(
                "reserved quantity cannot go negative ({} {:+})",
                self.quantity_reserved, delta_reserved
            )));
        }
        if reserved > on_hand {
            return Err(DomainError::invalid_state(format!(
                "reserved quantity {reserved} would exceed on-hand {on_hand}"
            )));
        }

        Ok(Self {
            quantity_on_hand: on_hand,
            quantity_reserved: reserved,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Replace thresholds; counts as a mutation (version bump).
    pub fn with_thresholds(&self, thresholds: StockThresholds, now: DateTime<Utc>) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        })
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = RecordKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}
