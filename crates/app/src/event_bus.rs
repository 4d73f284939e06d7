//! In-process bus backed by a tokio broadcast channel.
//!
//! Carries outbound [`Notice`]s to realtime subscribers. Notices are
//! best-effort: a slow subscriber may miss some. Inbound events go through
//! the bounded [`InProcessEventQueue`](crate::event_queue::InProcessEventQueue)
//! instead.

use std::future::Future;

use tokio::sync::broadcast;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Notice;

use crate::ports::NoticePublisher;

/// In-process bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the message is simply dropped).
pub struct InProcessEventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> InProcessEventBus<T> {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to messages on this bus.
    ///
    /// Returns a receiver that will get all messages published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    fn send(&self, message: T) {
        // Only fails when there are zero receivers.
        let _ = self.sender.send(message);
    }
}

impl NoticePublisher for InProcessEventBus<Notice> {
    fn publish(&self, notice: Notice) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        self.send(notice);
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::event::NoticeKind;

    #[tokio::test]
    async fn should_deliver_notice_to_multiple_subscribers() {
        let bus = InProcessEventBus::<Notice>::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Notice::new(NoticeKind::RuleCreated, serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap().kind, NoticeKind::RuleCreated);
        assert_eq!(rx2.recv().await.unwrap().kind, NoticeKind::RuleCreated);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::<Notice>::new(16);
        let result = bus
            .publish(Notice::new(NoticeKind::RunCompleted, serde_json::json!({})))
            .await;
        assert!(result.is_ok());
    }
}
