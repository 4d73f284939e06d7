//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod events;
#[allow(clippy::missing_errors_doc)]
pub mod rules;
#[allow(clippy::missing_errors_doc)]
pub mod runs;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod workflows;

use axum::Router;
use axum::routing::{get, post};

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<R, W, L, P, S>() -> Router<AppState<R, W, L, P, S>>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    Router::new()
        // Events
        .route("/events", post(events::ingest::<R, W, L, P, S>))
        // Rules
        .route(
            "/rules",
            get(rules::list::<R, W, L, P, S>).post(rules::create::<R, W, L, P, S>),
        )
        .route(
            "/rules/{id}",
            get(rules::get::<R, W, L, P, S>)
                .put(rules::update::<R, W, L, P, S>)
                .delete(rules::delete::<R, W, L, P, S>),
        )
        .route("/rules/{id}/toggle", post(rules::toggle::<R, W, L, P, S>))
        .route("/rules/{id}/run", post(rules::run::<R, W, L, P, S>))
        // Workflow templates
        .route(
            "/workflows",
            get(workflows::list::<R, W, L, P, S>).post(workflows::create::<R, W, L, P, S>),
        )
        .route(
            "/workflows/{id}",
            get(workflows::get::<R, W, L, P, S>)
                .put(workflows::update::<R, W, L, P, S>)
                .delete(workflows::delete::<R, W, L, P, S>),
        )
        .route("/workflows/{id}/run", post(workflows::run::<R, W, L, P, S>))
        // Runs
        .route("/runs", get(runs::list::<R, W, L, P, S>))
        .route("/runs/{id}", get(runs::get::<R, W, L, P, S>))
        // Realtime
        .route("/notices/stream", get(sse::stream::<R, W, L, P, S>))
}
