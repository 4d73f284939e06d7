//! In-process event queue backed by a bounded tokio mpsc channel.
//!
//! The queue has a single consumer, the event dispatcher. Events emitted
//! before it subscribes are buffered. A full queue rejects new events
//! instead of overwriting old ones, so anything `emit` accepted is
//! delivered.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Event;
use autoflow_domain::rule::TriggerType;

use crate::ports::{EventSink, EventSource, EventSubscription};

pub struct InProcessEventQueue {
    sender: mpsc::Sender<Event>,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl InProcessEventQueue {
    /// Create a queue holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl EventSource for InProcessEventQueue {
    /// Hand out the receiving end. Only the first call gets it; later
    /// subscriptions are closed from the start.
    fn subscribe(&self, types: &[TriggerType]) -> EventSubscription {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match receiver {
            Some(receiver) => EventSubscription::new(receiver, types),
            None => {
                tracing::warn!("event queue already has a consumer");
                EventSubscription::closed(types)
            }
        }
    }
}

impl EventSink for InProcessEventQueue {
    fn emit(&self, event: Event) -> Result<(), AutoflowError> {
        let event_id = event.id;
        match self.sender.try_send(event) {
            Ok(()) => {
                tracing::debug!(%event_id, "event queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%event_id, "event queue is full, event rejected");
                Err(AutoflowError::Unavailable(
                    "event queue is full, retry later".to_string(),
                ))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(%event_id, "event queue has no consumer, event rejected");
                Err(AutoflowError::Unavailable(
                    "event dispatcher is not running".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::event::DedupKey;

    fn event(event_type: TriggerType) -> Event {
        Event::new(event_type, serde_json::json!({}), DedupKey::new("k"))
    }

    #[tokio::test]
    async fn should_deliver_events_queued_before_subscribing() {
        let queue = InProcessEventQueue::new(4);
        let early = event(TriggerType::ClientCreated);
        let early_id = early.id;
        queue.emit(early).unwrap();

        let mut subscription = queue.subscribe(&TriggerType::EXTERNAL);
        assert_eq!(subscription.next().await.unwrap().id, early_id);
    }

    #[tokio::test]
    async fn should_filter_events_by_subscribed_type() {
        let queue = InProcessEventQueue::new(16);
        let mut subscription = queue.subscribe(&[TriggerType::ClientCreated]);

        queue.emit(event(TriggerType::NewProposal)).unwrap();
        let wanted = event(TriggerType::ClientCreated);
        let wanted_id = wanted.id;
        queue.emit(wanted).unwrap();

        assert_eq!(subscription.next().await.unwrap().id, wanted_id);
    }

    #[tokio::test]
    async fn should_reject_events_when_queue_is_full() {
        let queue = InProcessEventQueue::new(2);
        let mut subscription = queue.subscribe(&[TriggerType::TaskCompleted]);

        let mut accepted = 0;
        let mut rejected = 0;
        for _ in 0..5 {
            match queue.emit(event(TriggerType::TaskCompleted)) {
                Ok(()) => accepted += 1,
                Err(AutoflowError::Unavailable(_)) => rejected += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!((accepted, rejected), (2, 3));

        drop(queue);
        let mut received = 0;
        while subscription.next().await.is_some() {
            received += 1;
        }
        assert_eq!(received, accepted);
    }

    #[tokio::test]
    async fn should_reject_events_once_consumer_is_gone() {
        let queue = InProcessEventQueue::new(4);
        drop(queue.subscribe(&TriggerType::EXTERNAL));

        let result = queue.emit(event(TriggerType::ClientCreated));
        assert!(matches!(result, Err(AutoflowError::Unavailable(_))));
    }

    #[tokio::test]
    async fn should_hand_out_receiver_only_once() {
        let queue = InProcessEventQueue::new(4);
        let _first = queue.subscribe(&TriggerType::EXTERNAL);
        let mut second = queue.subscribe(&TriggerType::EXTERNAL);
        assert!(second.next().await.is_none());
    }

    #[tokio::test]
    async fn should_end_subscription_when_queue_dropped() {
        let queue = InProcessEventQueue::new(4);
        let mut subscription = queue.subscribe(&TriggerType::EXTERNAL);
        drop(queue);
        assert!(subscription.next().await.is_none());
    }
}
