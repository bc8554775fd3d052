use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tilestock_core::{LocationId, ProductId};

/// Envelope for an event, carrying the stock stream it belongs to.
///
/// A stream is one `(product, location)` inventory record. `sequence_number`
/// is the record version the change produced, so consumers can discard
/// stale or duplicated deliveries per stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,

    product_id: ProductId,
    location_id: LocationId,

    /// Record version after the change (0 when the event is not tied to a record mutation).
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        product_id: ProductId,
        location_id: LocationId,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            product_id,
            location_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

/// Messages that belong to one `(product, location)` stock stream.
///
/// Lets subscribers filter a shared bus down to the records they display.
pub trait StreamScoped {
    fn stream(&self) -> (ProductId, LocationId);
}

impl<E> StreamScoped for EventEnvelope<E> {
    fn stream(&self) -> (ProductId, LocationId) {
        (self.product_id, self.location_id)
    }
}
