//! `tilestock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model, and the optimistic
//! concurrency primitives shared by every stock aggregate.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    AlertId, BatchId, CartSessionId, LocationId, MovementId, OrderId, ProductId, ReservationId,
    UserId,
};
