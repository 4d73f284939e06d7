//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Mounts the JSON API under `/api` next to a `/health` check.
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build<R, W, L, P, S>(state: AppState<R, W, L, P, S>) -> Router
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
