//! Post-commit change notification.
//!
//! Observers run after the store has committed and cannot veto or roll back a
//! change. A failing observer is logged and skipped.

use std::sync::{Arc, RwLock};

use tracing::warn;
use uuid::Uuid;

use tilestock_events::{Event, EventBus, EventEnvelope};
use tilestock_inventory::StockEvent;

pub trait StockObserver: Send + Sync {
    fn on_stock_event(&self, event: &StockEvent);
}

/// Fan-out to every registered observer.
#[derive(Clone, Default)]
pub struct StockNotifier {
    observers: Arc<RwLock<Vec<Arc<dyn StockObserver>>>>,
}

impl core::fmt::Debug for StockNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.observers.read().map(|o| o.len()).unwrap_or(0);
        f.debug_struct("StockNotifier")
            .field("observers", &count)
            .finish()
    }
}

impl StockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn StockObserver>) {
        match self.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(_) => warn!("observer list poisoned; subscription dropped"),
        }
    }

    pub fn notify(&self, events: &[StockEvent]) {
        if events.is_empty() {
            return;
        }
        let observers = match self.observers.read() {
            Ok(o) => o.clone(),
            Err(_) => {
                warn!(events = events.len(), "observer list poisoned; notifications dropped");
                return;
            }
        };
        for event in events {
            for observer in &observers {
                observer.on_stock_event(event);
            }
        }
    }
}

/// Publishes every notification onto an event bus as an [`EventEnvelope`].
#[derive(Debug)]
pub struct BusObserver<B> {
    bus: B,
}

impl<B> BusObserver<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> StockObserver for BusObserver<B>
where
    B: EventBus<EventEnvelope<StockEvent>>,
{
    fn on_stock_event(&self, event: &StockEvent) {
        let key = event.stream();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            event.event_type(),
            key.product_id,
            key.location_id,
            event.sequence(),
            event.clone(),
        );
        if let Err(err) = self.bus.publish(envelope) {
            warn!(
                event_type = event.event_type(),
                record = %key,
                error = ?err,
                "failed to publish stock event"
            );
        }
    }
}
