//! In-memory event bus for tests/dev and single-process deployments.

use std::sync::{Mutex, mpsc};

use tilestock_core::{LocationId, ProductId};

use crate::bus::{EventBus, Subscription};
use crate::envelope::StreamScoped;

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send>;

struct Subscriber<M> {
    tx: mpsc::Sender<M>,
    /// `None` receives everything.
    filter: Option<Filter<M>>,
}

impl<M: Clone> Subscriber<M> {
    /// `false` once the receiving side is gone.
    fn deliver(&self, message: &M) -> bool {
        match &self.filter {
            Some(wants) if !wants(message) => true,
            _ => self.tx.send(message.clone()).is_ok(),
        }
    }
}

/// In-memory pub/sub bus for stock notifications.
///
/// Subscribers either take the whole feed (admin dashboards) or narrow it to
/// one product or one `(product, location)` record (storefront stock badges).
/// Delivery is best-effort, with no IO and no async. Subscribers whose receiver
/// was dropped are pruned on the next publish.
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions (as of the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Subscription that only receives messages matching `filter`.
    pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription<M>
    where
        F: Fn(&M) -> bool + Send + 'static,
    {
        self.register(Some(Box::new(filter)))
    }

    fn register(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { tx, filter });
        }

        Subscription::new(rx)
    }
}

impl<M> InMemoryEventBus<M>
where
    M: StreamScoped + 'static,
{
    /// Every change to `product_id`, at any location.
    pub fn subscribe_to_product(&self, product_id: ProductId) -> Subscription<M> {
        self.subscribe_filtered(move |m: &M| m.stream().0 == product_id)
    }

    /// Changes to a single inventory record.
    pub fn subscribe_to_record(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Subscription<M> {
        self.subscribe_filtered(move |m: &M| m.stream() == (product_id, location_id))
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|sub| sub.deliver(&message));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.register(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventEnvelope;
    use uuid::Uuid;

    fn change(product_id: ProductId, location_id: LocationId, version: u64) -> EventEnvelope<u64> {
        EventEnvelope::new(
            Uuid::now_v7(),
            "stock.record.changed",
            product_id,
            location_id,
            version,
            version,
        )
    }

    #[test]
    fn every_subscriber_receives_a_copy() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        drop(bus.subscribe_filtered(|n| n % 2 == 0));

        bus.publish(1).unwrap();
        // Filtered-out messages skip the channel, so pruning waits for a match.
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(2).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.drain(), vec![1, 2]);
    }

    #[test]
    fn scoped_subscriptions_only_see_their_stream() {
        let bus: InMemoryEventBus<EventEnvelope<u64>> = InMemoryEventBus::new();
        let (tile, grout) = (ProductId::new(), ProductId::new());
        let (shop, depot) = (LocationId::new(), LocationId::new());

        let all = bus.subscribe();
        let product = bus.subscribe_to_product(tile);
        let record = bus.subscribe_to_record(tile, depot);

        bus.publish(change(tile, shop, 1)).unwrap();
        bus.publish(change(grout, depot, 1)).unwrap();
        bus.publish(change(tile, depot, 2)).unwrap();

        assert_eq!(all.drain().len(), 3);
        let versions: Vec<u64> = product.drain().iter().map(|e| e.sequence_number()).collect();
        assert_eq!(versions, vec![1, 2]);
        let only = record.drain();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].stream(), (tile, depot));
    }
}
