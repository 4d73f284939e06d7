//! Trigger — the domain event type that makes a rule eligible to run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Enumerated set of event types rules can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    NewProposal,
    ProposalStatusChange,
    ClientCreated,
    TaskCompleted,
    DocumentUploaded,
    /// Synthesized by the scheduler for rules carrying a cron schedule.
    Scheduled,
    /// Synthesized for "run now" invocations.
    Manual,
}

impl TriggerType {
    /// Every trigger type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::NewProposal,
        Self::ProposalStatusChange,
        Self::ClientCreated,
        Self::TaskCompleted,
        Self::DocumentUploaded,
        Self::Scheduled,
        Self::Manual,
    ];

    /// Trigger types delivered by the external event source.
    pub const EXTERNAL: [Self; 5] = [
        Self::NewProposal,
        Self::ProposalStatusChange,
        Self::ClientCreated,
        Self::TaskCompleted,
        Self::DocumentUploaded,
    ];

    /// Wire name, e.g. `"new_proposal"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewProposal => "new_proposal",
            Self::ProposalStatusChange => "proposal_status_change",
            Self::ClientCreated => "client_created",
            Self::TaskCompleted => "task_completed",
            Self::DocumentUploaded => "document_uploaded",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidId(format!("unknown trigger type `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_every_variant_through_from_str() {
        for t in TriggerType::ALL {
            assert_eq!(t.as_str().parse::<TriggerType>().unwrap(), t);
        }
    }

    #[test]
    fn should_serialize_with_wire_name() {
        let json = serde_json::to_value(TriggerType::ProposalStatusChange).unwrap();
        assert_eq!(json, serde_json::json!("proposal_status_change"));
    }

    #[test]
    fn should_reject_unknown_trigger_name() {
        assert!("invoice_paid".parse::<TriggerType>().is_err());
    }

    #[test]
    fn should_not_list_synthetic_types_as_external() {
        assert!(!TriggerType::EXTERNAL.contains(&TriggerType::Scheduled));
        assert!(!TriggerType::EXTERNAL.contains(&TriggerType::Manual));
    }
}
