//! Threshold alerts.
//!
//! [`evaluate`] is a pure function of a record: it says which conditions hold
//! *now*. Turning conditions into persisted [`StockAlert`]s (update in place,
//! resolve when cleared) is the store side's job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tilestock_core::{AlertId, BatchId, DomainError, DomainResult, LocationId, ProductId, UserId};

use crate::batch::StockBatch;
use crate::record::{InventoryRecord, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    OutOfStock,
    Overstock,
    Expiring,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::LowStock => "low_stock",
            AlertType::OutOfStock => "out_of_stock",
            AlertType::Overstock => "overstock",
            AlertType::Expiring => "expiring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A condition that currently holds for a record (or one of its batches).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCondition {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub threshold_value: i64,
    pub current_value: i64,
    pub batch_id: Option<BatchId>,
    pub message: String,
}

/// Conditions implied by a record's quantities and thresholds.
pub fn evaluate(record: &InventoryRecord) -> Vec<AlertCondition> {
    let mut out = Vec::new();
    let available = record.quantity_available();
    let thresholds = record.thresholds();

    if available == 0 {
        out.push(AlertCondition {
            alert_type: AlertType::OutOfStock,
            severity: AlertSeverity::Critical,
            threshold_value: 0,
            current_value: 0,
            batch_id: None,
            message: "no units available".to_string(),
        });
    } else if let Some(reorder_point) = thresholds.reorder_point {
        if available <= reorder_point {
            let severity = if available * 2 <= reorder_point {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            out.push(AlertCondition {
                alert_type: AlertType::LowStock,
                severity,
                threshold_value: reorder_point,
                current_value: available,
                batch_id: None,
                message: format!("{available} available, reorder point is {reorder_point}"),
            });
        }
    }

    if let Some(max) = thresholds.max_stock_level {
        if record.quantity_on_hand() > max {
            out.push(AlertCondition {
                alert_type: AlertType::Overstock,
                severity: AlertSeverity::Low,
                threshold_value: max,
                current_value: record.quantity_on_hand(),
                batch_id: None,
                message: format!(
                    "{} on hand exceeds max stock level {max}",
                    record.quantity_on_hand()
                ),
            });
        }
    }

    out
}

/// `expiring` condition for a batch whose expiry falls within `window` of `now`.
pub fn evaluate_batch(
    batch: &StockBatch,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<AlertCondition> {
    let expiry = batch.expiry_date?;
    if batch.is_depleted() || expiry > now + window {
        return None;
    }

    let days_left = (expiry - now).num_days();
    let severity = if expiry <= now {
        AlertSeverity::Critical
    } else if days_left <= 7 {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    };

    Some(AlertCondition {
        alert_type: AlertType::Expiring,
        severity,
        threshold_value: window.num_days(),
        current_value: batch.current_quantity,
        batch_id: Some(batch.id),
        message: format!(
            "batch {} ({} units) expires {}",
            batch.batch_number,
            batch.current_quantity,
            expiry.format("%Y-%m-%d")
        ),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: AlertId,
    pub alert_type: AlertType,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub batch_id: Option<BatchId>,
    pub threshold_value: i64,
    pub current_value: i64,
    pub severity: AlertSeverity,
    pub message: String,
    pub is_active: bool,
    pub is_acknowledged: bool,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl StockAlert {
    pub fn raise(key: RecordKey, condition: AlertCondition, now: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::new(),
            alert_type: condition.alert_type,
            product_id: key.product_id,
            location_id: key.location_id,
            batch_id: condition.batch_id,
            threshold_value: condition.threshold_value,
            current_value: condition.current_value,
            severity: condition.severity,
            message: condition.message,
            is_active: true,
            is_acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.product_id, self.location_id)
    }

    /// Same record, same type, same batch.
    pub fn matches(&self, key: RecordKey, condition: &AlertCondition) -> bool {
        self.key() == key
            && self.alert_type == condition.alert_type
            && self.batch_id == condition.batch_id
    }

    /// Update in place with the latest reading. Returns whether anything changed.
    pub fn refresh(&mut self, condition: AlertCondition, now: DateTime<Utc>) -> bool {
        let changed = self.current_value != condition.current_value
            || self.threshold_value != condition.threshold_value
            || self.severity != condition.severity;
        self.current_value = condition.current_value;
        self.threshold_value = condition.threshold_value;
        self.severity = condition.severity;
        self.message = condition.message;
        self.updated_at = now;
        changed
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.resolved_at = Some(now);
        self.updated_at = now;
    }

    pub fn acknowledge(&mut self, by: Option<UserId>, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::invalid_state("alert is already resolved"));
        }
        self.is_acknowledged = true;
        self.acknowledged_by = by;
        self.acknowledged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// Which alerts an evaluation is authoritative for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertScope {
    /// `low_stock`, `out_of_stock` and `overstock` on the record itself.
    Thresholds,
    /// `expiring` for one batch.
    Batch(BatchId),
}

impl AlertScope {
    pub fn governs(self, alert: &StockAlert) -> bool {
        match self {
            AlertScope::Thresholds => {
                alert.batch_id.is_none()
                    && matches!(
                        alert.alert_type,
                        AlertType::LowStock | AlertType::OutOfStock | AlertType::Overstock
                    )
            }
            AlertScope::Batch(id) => {
                alert.alert_type == AlertType::Expiring && alert.batch_id == Some(id)
            }
        }
    }
}

/// Outcome of reconciling fresh conditions against stored alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertReconciliation {
    /// Newly created alerts.
    pub raised: Vec<StockAlert>,
    /// Existing active alerts updated in place.
    pub updated: Vec<StockAlert>,
    /// Alerts whose condition cleared.
    pub resolved: Vec<StockAlert>,
}

impl AlertReconciliation {
    pub fn is_empty(&self) -> bool {
        self.raised.is_empty() && self.updated.is_empty() && self.resolved.is_empty()
    }

    /// Every alert that must be written back.
    pub fn writes(&self) -> impl Iterator<Item = &StockAlert> {
        self.raised
            .iter()
            .chain(self.updated.iter())
            .chain(self.resolved.iter())
    }
}

/// Upsert semantics: an active alert of the same type (and batch) for the same
/// record is refreshed rather than duplicated; active alerts in `scope` with no
/// matching condition are resolved. Acknowledgement survives refreshes.
pub fn reconcile(
    existing_active: &[StockAlert],
    key: RecordKey,
    scope: AlertScope,
    conditions: Vec<AlertCondition>,
    now: DateTime<Utc>,
) -> AlertReconciliation {
    let mut out = AlertReconciliation::default();
    let mut matched = Vec::new();

    for condition in conditions {
        match existing_active
            .iter()
            .find(|a| a.is_active && a.matches(key, &condition))
        {
            Some(current) => {
                let mut alert = current.clone();
                matched.push(alert.id);
                if alert.refresh(condition, now) {
                    out.updated.push(alert);
                }
            }
            None => out.raised.push(StockAlert::raise(key, condition, now)),
        }
    }

    for alert in existing_active {
        if alert.is_active
            && alert.key() == key
            && scope.governs(alert)
            && !matched.contains(&alert.id)
        {
            let mut resolved = alert.clone();
            resolved.resolve(now);
            out.resolved.push(resolved);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StockThresholds;

    fn record_with(on_hand: i64, reserved: i64, thresholds: StockThresholds) -> InventoryRecord {
        InventoryRecord::new(ProductId::new(), LocationId::new(), thresholds, Utc::now())
            .unwrap()
            .apply_delta(on_hand, reserved, Utc::now())
            .unwrap()
    }

    fn reorder_at(point: i64) -> StockThresholds {
        StockThresholds {
            reorder_point: Some(point),
            ..StockThresholds::default()
        }
    }

    fn types(conds: &[AlertCondition]) -> Vec<AlertType> {
        conds.iter().map(|c| c.alert_type).collect()
    }

    #[test]
    fn zero_available_is_critical_out_of_stock() {
        let conds = evaluate(&record_with(5, 5, reorder_at(10)));
        assert_eq!(types(&conds), vec![AlertType::OutOfStock]);
        assert_eq!(conds[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn low_stock_severity_scales_with_shortfall() {
        let medium = evaluate(&record_with(8, 0, reorder_at(10)));
        assert_eq!(medium[0].alert_type, AlertType::LowStock);
        assert_eq!(medium[0].severity, AlertSeverity::Medium);

        let high = evaluate(&record_with(5, 0, reorder_at(10)));
        assert_eq!(high[0].severity, AlertSeverity::High);
    }

    #[test]
    fn healthy_stock_raises_nothing() {
        assert!(evaluate(&record_with(11, 0, reorder_at(10))).is_empty());
        assert!(evaluate(&record_with(3, 0, StockThresholds::default())).is_empty());
    }

    #[test]
    fn overstock_uses_on_hand_not_available() {
        let t = StockThresholds {
            max_stock_level: Some(100),
            ..StockThresholds::default()
        };
        let conds = evaluate(&record_with(120, 50, t));
        assert_eq!(types(&conds), vec![AlertType::Overstock]);
        assert_eq!(conds[0].severity, AlertSeverity::Low);
        assert_eq!(conds[0].current_value, 120);
    }

    #[test]
    fn batch_expiry_window_and_severity() {
        let now = Utc::now();
        let mut batch = StockBatch::receive(
            "LOT-1",
            ProductId::new(),
            LocationId::new(),
            4,
            None,
            Some(now + Duration::days(3)),
            now,
        )
        .unwrap();

        let c = evaluate_batch(&batch, now, Duration::days(30)).unwrap();
        assert_eq!(c.severity, AlertSeverity::High);

        batch.expiry_date = Some(now + Duration::days(20));
        assert_eq!(
            evaluate_batch(&batch, now, Duration::days(30)).unwrap().severity,
            AlertSeverity::Medium
        );
        assert!(evaluate_batch(&batch, now, Duration::days(10)).is_none());

        batch.expiry_date = Some(now - Duration::days(1));
        assert_eq!(
            evaluate_batch(&batch, now, Duration::days(30)).unwrap().severity,
            AlertSeverity::Critical
        );
    }

    #[test]
    fn reconcile_updates_in_place_instead_of_duplicating() {
        let r = record_with(8, 0, reorder_at(10));
        let now = Utc::now();
        let first = reconcile(&[], r.key(), AlertScope::Thresholds, evaluate(&r), now);
        assert_eq!(first.raised.len(), 1);

        let mut existing = first.raised.clone();
        existing[0].acknowledge(None, now).unwrap();

        let lower = r.apply_delta(-3, 0, now).unwrap();
        let second = reconcile(
            &existing,
            lower.key(),
            AlertScope::Thresholds,
            evaluate(&lower),
            now,
        );
        assert!(second.raised.is_empty());
        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.updated[0].id, existing[0].id);
        assert_eq!(second.updated[0].current_value, 5);
        assert_eq!(second.updated[0].severity, AlertSeverity::High);
        assert!(second.updated[0].is_acknowledged);
    }

    #[test]
    fn reconcile_resolves_cleared_conditions_only_in_scope() {
        let r = record_with(0, 0, reorder_at(10));
        let now = Utc::now();
        let mut existing = reconcile(&[], r.key(), AlertScope::Thresholds, evaluate(&r), now).raised;

        let batch_id = BatchId::new();
        existing.push(StockAlert::raise(
            r.key(),
            AlertCondition {
                alert_type: AlertType::Expiring,
                severity: AlertSeverity::High,
                threshold_value: 30,
                current_value: 4,
                batch_id: Some(batch_id),
                message: "expiring".into(),
            },
            now,
        ));

        let restocked = r.apply_delta(50, 0, now).unwrap();
        let rec = reconcile(
            &existing,
            restocked.key(),
            AlertScope::Thresholds,
            evaluate(&restocked),
            now,
        );
        assert_eq!(rec.resolved.len(), 1);
        assert_eq!(rec.resolved[0].alert_type, AlertType::OutOfStock);
        assert!(!rec.resolved[0].is_active);
        assert!(rec.resolved[0].resolved_at.is_some());
    }

    #[test]
    fn resolved_alerts_cannot_be_acknowledged() {
        let r = record_with(0, 0, StockThresholds::default());
        let cond = evaluate(&r).remove(0);
        let mut alert = StockAlert::raise(r.key(), cond, Utc::now());
        alert.resolve(Utc::now());
        assert!(alert.acknowledge(None, Utc::now()).is_err());
    }
}
