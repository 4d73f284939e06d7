//! Execution run queries.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};
use autoflow_domain::run::ExecutionRun;

use super::rules::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// `GET /api/runs?limit=N` — most recent runs first.
pub async fn list<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ExecutionRun>>, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let runs = state.engine.list_runs(limit).await?;
    Ok(Json(runs))
}

/// `GET /api/runs/:id` — run status with per-step detail.
pub async fn get<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionRun>, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let run = state.engine.get_run_status(parse_id(&id)?).await?;
    Ok(Json(run))
}
