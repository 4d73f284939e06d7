//! Events — inbound domain events and outbound realtime notices.
//!
//! Inbound [`Event`]s are delivered at least once by the event source and
//! carry a [`DedupKey`] identifying the logical occurrence. Outbound
//! [`Notice`]s are fire-and-forget messages for UI subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{EventId, OwnerId, RunId};
use crate::rule::TriggerType;
use crate::time::{Timestamp, now};

/// Identifies one logical event occurrence across duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

const SCHEDULED_PREFIX: &str = "schedule:";

impl DedupKey {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Key for a "run now" invocation; unique per call.
    #[must_use]
    pub fn manual() -> Self {
        Self(format!("manual:{}", RunId::new()))
    }

    /// Key for a scheduled slot of a rule or template.
    ///
    /// Identical for every tick that observes the same slot, so a
    /// recovered tick collapses onto the run of the original one.
    #[must_use]
    pub fn scheduled(owner: impl fmt::Display, slot: Timestamp) -> Self {
        Self(format!("{SCHEDULED_PREFIX}{owner}:{}", crate::time::to_sortable(slot)))
    }

    /// Scheduled-slot keys are never reused, even once their run is
    /// terminal.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.0.starts_with(SCHEDULED_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A domain event emitted by the event source (or synthesized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: TriggerType,
    pub payload: serde_json::Value,
    pub dedup_key: DedupKey,
    pub owner_id: Option<OwnerId>,
    pub occurred_at: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: TriggerType, payload: serde_json::Value, dedup_key: DedupKey) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            payload,
            dedup_key,
            owner_id: None,
            occurred_at: now(),
        }
    }

    /// Synthetic event for a manual invocation.
    #[must_use]
    pub fn manual(payload: serde_json::Value) -> Self {
        Self::new(TriggerType::Manual, payload, DedupKey::manual())
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// Kind of outbound realtime notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    RuleCreated,
    RuleUpdated,
    RuleDeleted,
    WorkflowCreated,
    WorkflowUpdated,
    WorkflowDeleted,
    RunCompleted,
}

/// Best-effort message published to UI subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Notice {
    #[must_use]
    pub fn new(kind: NoticeKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: now(),
        }
    }
}
