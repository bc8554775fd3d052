//! Inventory domain module.
//!
//! This crate contains the business rules for stock bookkeeping, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`record`]: the per-(product, location) quantity aggregate
//! - [`movement`]: immutable ledger entries
//! - [`reservation`]: the hold state machine
//! - [`alert`]: threshold evaluation
//! - [`batch`]: optional lot tracking
//! - [`event`]: change notifications published after commits

pub mod alert;
pub mod batch;
pub mod event;
pub mod movement;
pub mod record;
pub mod reservation;

pub use alert::{
    AlertCondition, AlertReconciliation, AlertScope, AlertSeverity, AlertType, StockAlert,
    evaluate, evaluate_batch, reconcile,
};
pub use batch::StockBatch;
pub use event::StockEvent;
pub use movement::{Direction, MovementStatus, MovementType, NewMovement, StockMovement};
pub use record::{InventoryRecord, RecordKey, StockLevels, StockThresholds};
pub use reservation::{ReleaseCause, ReservationHolder, ReservationStatus, StockReservation};
