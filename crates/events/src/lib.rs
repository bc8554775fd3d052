//! Stock change events and their distribution.
//!
//! Mechanics only: the concrete event payloads live in the domain crate
//! (`tilestock-inventory`); this crate defines how they are described,
//! wrapped, and fanned out to subscribers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamScoped};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
