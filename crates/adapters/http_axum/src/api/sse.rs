//! Server-Sent Events (SSE) stream of realtime notices.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};

use crate::state::AppState;

/// `GET /api/notices/stream` — rule, template and run notices as they happen.
///
/// Each notice is sent as one JSON `data:` frame. Delivery is best effort:
/// a subscriber that falls behind loses the notices it missed.
pub async fn stream<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let notice_rx = state.notices.subscribe();
    let notice_stream = BroadcastStream::new(notice_rx).filter_map(|result| match result {
        Ok(notice) => match serde_json::to_string(&notice) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize notice for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "SSE subscriber lagged, some notices were dropped");
            None
        }
    });

    Sse::new(notice_stream).keep_alive(KeepAlive::default())
}
