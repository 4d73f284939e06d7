//! JSON REST handlers for workflow templates.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};
use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::DedupKey;
use autoflow_domain::id::{OwnerId, TemplateId};
use autoflow_domain::run::ExecutionRun;
use autoflow_domain::schedule::Schedule;
use autoflow_domain::workflow::{WorkflowKind, WorkflowStep, WorkflowTemplate};

use super::rules::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating or replacing a workflow template.
#[derive(Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    pub steps: Vec<WorkflowStep>,
    pub schedule: Option<String>,
    pub owner_id: Option<OwnerId>,
}

impl TemplateRequest {
    fn into_template(self, id: Option<TemplateId>) -> Result<WorkflowTemplate, AutoflowError> {
        let mut builder = WorkflowTemplate::builder()
            .name(self.name)
            .description(self.description)
            .kind(self.kind);
        if let Some(id) = id {
            builder = builder.id(id);
        }
        if let Some(owner_id) = self.owner_id {
            builder = builder.owner_id(owner_id);
        }
        if let Some(expression) = self.schedule {
            builder = builder.schedule(Schedule::parse(expression)?);
        }
        for step in self.steps {
            builder = builder.step(step);
        }
        builder.build()
    }
}

/// Request body for running a template.
#[derive(Deserialize, Default)]
pub struct RunWorkflowRequest {
    #[serde(default)]
    pub input: serde_json::Value,
    pub dedup_key: Option<String>,
}

pub enum TemplateResponse {
    Ok(Json<WorkflowTemplate>),
    Created(Json<WorkflowTemplate>),
    List(Json<Vec<WorkflowTemplate>>),
    NoContent,
}

impl IntoResponse for TemplateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
            Self::List(json) => json.into_response(),
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/workflows`
pub async fn list<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
) -> Result<TemplateResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let templates = state.workflow_service.list_templates().await?;
    Ok(TemplateResponse::List(Json(templates)))
}

/// `GET /api/workflows/:id`
pub async fn get<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<TemplateResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let template = state.workflow_service.get_template(parse_id(&id)?).await?;
    Ok(TemplateResponse::Ok(Json(template)))
}

/// `POST /api/workflows`
pub async fn create<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Json(req): Json<TemplateRequest>,
) -> Result<TemplateResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let template = req.into_template(None)?;
    let created = state.workflow_service.create_template(template).await?;
    Ok(TemplateResponse::Created(Json(created)))
}

/// `PUT /api/workflows/:id`
pub async fn update<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
    Json(req): Json<TemplateRequest>,
) -> Result<TemplateResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let template = req.into_template(Some(parse_id(&id)?))?;
    let updated = state.workflow_service.update_template(template).await?;
    Ok(TemplateResponse::Ok(Json(updated)))
}

/// `DELETE /api/workflows/:id` — refused while anything still references it.
pub async fn delete<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<TemplateResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    state.workflow_service.delete_template(parse_id(&id)?).await?;
    Ok(TemplateResponse::NoContent)
}

/// `POST /api/workflows/:id/run` — execute a template with the given input.
///
/// Without a `dedup_key` every call is a fresh run.
pub async fn run<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
    body: Option<Json<RunWorkflowRequest>>,
) -> Result<Json<ExecutionRun>, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let template_id = parse_id(&id)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let run = match req.dedup_key {
        Some(key) => {
            state
                .engine
                .run_workflow_keyed(template_id, req.input, DedupKey::new(key))
                .await?
        }
        None => state.engine.run_workflow(template_id, req.input).await?,
    };
    Ok(Json(run))
}
