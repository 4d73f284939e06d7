//! Realtime notice port — fire-and-forget messages for UI subscribers.

use std::future::Future;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Notice;

/// Publishes [`Notice`]s to interested subscribers.
///
/// Delivery is best-effort; callers ignore failures.
pub trait NoticePublisher {
    /// Publish a notice to all current subscribers.
    fn publish(&self, notice: Notice) -> impl Future<Output = Result<(), AutoflowError>> + Send;
}

impl<T: NoticePublisher + Send + Sync> NoticePublisher for std::sync::Arc<T> {
    fn publish(&self, notice: Notice) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        (**self).publish(notice)
    }
}
