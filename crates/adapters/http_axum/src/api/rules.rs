//! JSON REST handlers for automation rules.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};
use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::{DedupKey, Event};
use autoflow_domain::id::{OwnerId, RuleId};
use autoflow_domain::rule::{ActionSpec, AutomationRule, Condition, TriggerType};
use autoflow_domain::run::ExecutionRun;
use autoflow_domain::schedule::Schedule;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating or replacing a rule.
#[derive(Deserialize)]
pub struct RuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_type: TriggerType,
    pub schedule: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub continue_on_error: bool,
    pub owner_id: Option<OwnerId>,
}

impl RuleRequest {
    fn into_rule(self, id: Option<RuleId>) -> Result<AutomationRule, AutoflowError> {
        let mut builder = AutomationRule::builder()
            .name(self.name)
            .description(self.description)
            .trigger_type(self.trigger_type)
            .continue_on_error(self.continue_on_error);
        if let Some(id) = id {
            builder = builder.id(id);
        }
        if let Some(owner_id) = self.owner_id {
            builder = builder.owner_id(owner_id);
        }
        if let Some(expression) = self.schedule {
            builder = builder.schedule(Schedule::parse(expression)?);
        }
        for condition in self.conditions {
            builder = builder.condition(condition);
        }
        for action in self.actions {
            builder = builder.action(action);
        }
        builder.build()
    }
}

/// Request body for a "run now" invocation.
#[derive(Deserialize, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Lets a client retry the call without running the rule twice.
    pub dedup_key: Option<String>,
}

pub enum RuleResponse {
    Ok(Json<AutomationRule>),
    Created(Json<AutomationRule>),
    List(Json<Vec<AutomationRule>>),
    NoContent,
}

impl IntoResponse for RuleResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
            Self::List(json) => json.into_response(),
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

pub(crate) fn parse_id<T: FromStr>(id: &str) -> Result<T, ApiError> {
    T::from_str(id).map_err(|_| ApiError::invalid_id(id))
}

/// `GET /api/rules` — list non-deleted rules.
pub async fn list<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rules = state.rule_service.list_rules().await?;
    Ok(RuleResponse::List(Json(rules)))
}

/// `GET /api/rules/:id` — get a rule, deleted ones included.
pub async fn get<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rule = state.rule_service.get_rule(parse_id(&id)?).await?;
    Ok(RuleResponse::Ok(Json(rule)))
}

/// `POST /api/rules` — create a rule. It is active once saved.
pub async fn create<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Json(req): Json<RuleRequest>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rule = req.into_rule(None)?;
    let created = state.rule_service.create_rule(rule).await?;
    Ok(RuleResponse::Created(Json(created)))
}

/// `PUT /api/rules/:id` — replace a rule definition.
pub async fn update<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
    Json(req): Json<RuleRequest>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rule = req.into_rule(Some(parse_id(&id)?))?;
    let updated = state.rule_service.update_rule(rule).await?;
    Ok(RuleResponse::Ok(Json(updated)))
}

/// `POST /api/rules/:id/toggle` — flip between active and inactive.
pub async fn toggle<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rule = state.rule_service.toggle_rule(parse_id(&id)?).await?;
    Ok(RuleResponse::Ok(Json(rule)))
}

/// `DELETE /api/rules/:id` — soft-delete a rule.
pub async fn delete<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
) -> Result<RuleResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    state.rule_service.delete_rule(parse_id(&id)?).await?;
    Ok(RuleResponse::NoContent)
}

/// `POST /api/rules/:id/run` — run a rule now and wait for the outcome.
pub async fn run<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Path(id): Path<String>,
    body: Option<Json<RunRequest>>,
) -> Result<Json<ExecutionRun>, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    let rule_id = parse_id(&id)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let event = match req.dedup_key {
        Some(key) => Event::new(TriggerType::Manual, req.payload, DedupKey::new(key)),
        None => Event::manual(req.payload),
    };
    let run = state.engine.run_rule(rule_id, event).await?;
    Ok(Json(run))
}
