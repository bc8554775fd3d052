//! Error types surfaced by the stock subsystem.

use thiserror::Error;

use tilestock_core::DomainError;
use tilestock_inventory::ReservationStatus;

/// Failure reported by a store implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale record version (optimistic concurrency).
    #[error("version conflict on {key} (expected {expected}, actual {actual})")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A reservation moved out of the status the writer read.
    #[error("reservation {id} is {actual:?}, expected {expected:?}")]
    ReservationConflict {
        id: String,
        expected: ReservationStatus,
        actual: ReservationStatus,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Backing store I/O failure (or a poisoned lock in-process).
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl StoreError {
    /// Lost an optimistic race; re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::ReservationConflict { .. }
        )
    }
}

/// Error returned to callers of the stock operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Unknown product, location, reservation, movement or alert.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// The change would drive a quantity negative or break a state-machine rule.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Lost an optimistic concurrency race. Retried internally; callers only
    /// ever see [`StockError::ConcurrentUpdateFailure`].
    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("concurrent update failure after {attempts} attempts")]
    ConcurrentUpdateFailure { attempts: u32 },

    #[error("transaction failure: {0}")]
    TransactionFailure(String),
}

impl StockError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            StockError::NotFound(_) => "not_found",
            StockError::InsufficientStock { .. } => "insufficient_stock",
            StockError::InvalidState(_) => "invalid_state",
            StockError::Validation(_) => "validation_error",
            StockError::VersionConflict(_) | StockError::ConcurrentUpdateFailure { .. } => {
                "concurrent_update"
            }
            StockError::TransactionFailure(_) => "transaction_failure",
        }
    }

    /// Text the storefront / admin screens show.
    pub fn user_message(&self) -> String {
        match self {
            StockError::InsufficientStock { .. } => "not enough stock available".to_string(),
            StockError::VersionConflict(_) | StockError::ConcurrentUpdateFailure { .. } => {
                "please retry, stock was updated concurrently".to_string()
            }
            StockError::TransactionFailure(_) => {
                "stock service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => StockError::Validation(msg),
            DomainError::InvalidState(msg) => StockError::InvalidState(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => StockError::InsufficientStock {
                requested,
                available,
            },
            DomainError::NotFound(what) => StockError::NotFound(what),
            e @ DomainError::VersionConflict { .. } => StockError::VersionConflict(e.to_string()),
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => StockError::NotFound(what),
            e if e.is_conflict() => StockError::VersionConflict(e.to_string()),
            StoreError::InvalidState(msg) | StoreError::Duplicate(msg) => {
                StockError::InvalidState(msg)
            }
            StoreError::Transaction(msg) => StockError::TransactionFailure(msg),
            e => StockError::TransactionFailure(e.to_string()),
        }
    }
}
