//! Automation rules — trigger → conditions → actions.
//!
//! A rule becomes eligible when an event of its [`TriggerType`] arrives,
//! runs only if all of its [`Condition`]s hold against the payload, and
//! then executes its [`ActionSpec`]s in order.

mod action;
mod condition;
mod trigger;

pub use action::{ActionSpec, ActionType};
pub use condition::{Condition, evaluate_all};
pub use trigger::TriggerType;

use serde::{Deserialize, Serialize};

use crate::error::{AutoflowError, ConfigurationError, ValidationError};
use crate::id::{OwnerId, RuleId, TemplateId};
use crate::schedule::Schedule;
use crate::time::{Timestamp, now};

/// Lifecycle of a rule.
///
/// `draft → active` on first save, `active ⇄ inactive` via toggle, and
/// any non-deleted state `→ deleted` (soft delete; rows are kept for run
/// history).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    Active,
    Inactive,
    Deleted,
}

impl RuleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(ValidationError::InvalidId(format!(
                "unknown rule status `{other}`"
            ))),
        }
    }
}

/// A persisted trigger → conditions → actions mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_type: TriggerType,
    /// Required for [`TriggerType::Scheduled`], forbidden otherwise.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionSpec>,
    /// Run every action and aggregate instead of stopping at the first
    /// failure.
    #[serde(default)]
    pub continue_on_error: bool,
    pub status: RuleStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Only active rules are ever matched.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Templates this rule runs through `run_workflow` actions.
    pub fn referenced_templates(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.actions.iter().filter_map(ActionSpec::referenced_template)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - an action lacks a required parameter
    ///
    /// Returns [`AutoflowError::Configuration`] for malformed conditions or
    /// a schedule that does not agree with the trigger type.
    pub fn validate(&self) -> Result<(), AutoflowError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        for action in &self.actions {
            action.validate()?;
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        match (self.trigger_type, &self.schedule) {
            (TriggerType::Scheduled, None) => Err(ConfigurationError::MissingSchedule.into()),
            (TriggerType::Scheduled, Some(_)) | (_, None) => Ok(()),
            (_, Some(_)) => Err(ConfigurationError::UnexpectedSchedule.into()),
        }
    }

    /// `draft → active`. Active rules are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] for deleted rules.
    pub fn activate(&mut self) -> Result<(), ValidationError> {
        self.transition(RuleStatus::Active)
    }

    /// `active → inactive`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] for deleted rules.
    pub fn deactivate(&mut self) -> Result<(), ValidationError> {
        self.transition(RuleStatus::Inactive)
    }

    /// Flip between active and inactive.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] for deleted rules.
    pub fn toggle(&mut self) -> Result<(), ValidationError> {
        if self.is_active() {
            self.deactivate()
        } else {
            self.activate()
        }
    }

    /// Soft delete. The rule is never matched again.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] if already deleted.
    pub fn mark_deleted(&mut self) -> Result<(), ValidationError> {
        self.transition(RuleStatus::Deleted)
    }

    fn transition(&mut self, to: RuleStatus) -> Result<(), ValidationError> {
        if self.status == RuleStatus::Deleted {
            return Err(ValidationError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if self.status != to {
            self.status = to;
            self.updated_at = now();
        }
        Ok(())
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<RuleId>,
    owner_id: Option<OwnerId>,
    name: Option<String>,
    description: Option<String>,
    trigger_type: Option<TriggerType>,
    schedule: Option<Schedule>,
    conditions: Vec<Condition>,
    actions: Vec<ActionSpec>,
    continue_on_error: bool,
    status: Option<RuleStatus>,
    created_at: Option<Timestamp>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn owner_id(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn trigger_type(mut self, trigger_type: TriggerType) -> Self {
        self.trigger_type = Some(trigger_type);
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    #[must_use]
    pub fn status(mut self, status: RuleStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// New rules start as [`RuleStatus::Draft`] unless a status is given.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation reported by
    /// [`AutomationRule::validate`].
    pub fn build(self) -> Result<AutomationRule, AutoflowError> {
        let created_at = self.created_at.unwrap_or_else(now);
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            owner_id: self.owner_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            trigger_type: self.trigger_type.unwrap_or(TriggerType::Manual),
            schedule: self.schedule,
            conditions: self.conditions,
            actions: self.actions,
            continue_on_error: self.continue_on_error,
            status: self.status.unwrap_or(RuleStatus::Draft),
            created_at,
            updated_at: created_at,
        };
        rule.validate()?;
        Ok(rule)
    }
}
