//! Event source port — inbound domain events with backpressure.

use tokio::sync::mpsc;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Event;
use autoflow_domain::rule::TriggerType;

/// Delivers inbound [`Event`]s. Duplicates are expected; the run ledger
/// collapses them.
pub trait EventSource {
    /// Subscribe to events of the given types.
    fn subscribe(&self, types: &[TriggerType]) -> EventSubscription;
}

/// Accepts inbound events from producers (HTTP ingestion, integrations).
pub trait EventSink {
    /// Hand an event to the source for dispatch.
    ///
    /// An `Ok` means the event is queued and will be delivered.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::Unavailable`] when the event cannot be
    /// enqueued (queue full, or no consumer left).
    fn emit(&self, event: Event) -> Result<(), AutoflowError>;
}

impl<T: EventSink> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: Event) -> Result<(), AutoflowError> {
        (**self).emit(event)
    }
}

/// A filtered view over the receiving end of an event queue.
pub struct EventSubscription {
    receiver: mpsc::Receiver<Event>,
    types: Vec<TriggerType>,
}

impl EventSubscription {
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<Event>, types: &[TriggerType]) -> Self {
        Self {
            receiver,
            types: types.to_vec(),
        }
    }

    /// A subscription that is already at its end.
    #[must_use]
    pub fn closed(types: &[TriggerType]) -> Self {
        let (_, receiver) = mpsc::channel(1);
        Self::new(receiver, types)
    }

    /// Wait for the next event of a subscribed type.
    ///
    /// Returns `None` once the source is closed and drained.
    pub async fn next(&mut self) -> Option<Event> {
        while let Some(event) = self.receiver.recv().await {
            if self.types.contains(&event.event_type) {
                return Some(event);
            }
            tracing::warn!(event_id = %event.id, event_type = %event.event_type, "event of unsubscribed type discarded");
        }
        None
    }
}
