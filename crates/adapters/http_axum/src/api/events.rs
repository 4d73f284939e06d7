//! Event ingestion.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use autoflow_app::ports::{
    EventSink, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};
use autoflow_domain::error::{AutoflowError, ValidationError};
use autoflow_domain::event::{DedupKey, Event};
use autoflow_domain::id::{EventId, OwnerId};
use autoflow_domain::rule::TriggerType;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for ingesting an event.
#[derive(Deserialize)]
pub struct IngestEventRequest {
    #[serde(rename = "type")]
    pub event_type: TriggerType,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Identifies the logical occurrence across redeliveries. Defaults to
    /// the generated event id, which makes every request distinct.
    pub dedup_key: Option<String>,
    pub owner_id: Option<OwnerId>,
}

#[derive(Serialize)]
pub struct Accepted {
    pub event_id: EventId,
    pub dedup_key: DedupKey,
}

pub enum IngestResponse {
    Accepted(Json<Accepted>),
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/events` — hand an event to the dispatcher.
///
/// Returns as soon as the event is queued; matching rules run in the
/// background. A full queue answers `503` and the producer retries.
pub async fn ingest<R, W, L, P, S>(
    State(state): State<AppState<R, W, L, P, S>>,
    Json(req): Json<IngestEventRequest>,
) -> Result<IngestResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
    S: EventSink + Send + Sync + 'static,
{
    if !TriggerType::EXTERNAL.contains(&req.event_type) {
        return Err(ApiError::from(AutoflowError::from(
            ValidationError::InternalEventType(req.event_type.to_string()),
        )));
    }
    let id = EventId::new();
    let dedup_key = DedupKey::new(req.dedup_key.unwrap_or_else(|| id.to_string()));
    let mut event = Event::new(req.event_type, req.payload, dedup_key.clone());
    event.id = id;
    if let Some(owner_id) = req.owner_id {
        event = event.with_owner(owner_id);
    }

    state.events.emit(event)?;
    tracing::debug!(event_id = %id, %dedup_key, "event accepted");
    Ok(IngestResponse::Accepted(Json(Accepted {
        event_id: id,
        dedup_key,
    })))
}
