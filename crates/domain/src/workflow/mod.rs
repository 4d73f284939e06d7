//! Workflow templates — named graphs of steps with an execution mode.

mod graph;

pub use graph::check_references;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AutoflowError, ConfigurationError, ValidationError};
use crate::id::{OwnerId, StepId, TemplateId};
use crate::rule::{ActionSpec, Condition, TriggerType};
use crate::schedule::Schedule;
use crate::time::{Timestamp, now};

/// How the steps of a template are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowKind {
    /// One step at a time, in list order, fail-fast.
    Sequential,
    /// All steps at once; the run waits for every step.
    Parallel,
    /// The leading condition picks the `then` or `else` subset.
    Conditional,
}

impl WorkflowKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "SEQUENTIAL",
            Self::Parallel => "PARALLEL",
            Self::Conditional => "CONDITIONAL",
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEQUENTIAL" => Ok(Self::Sequential),
            "PARALLEL" => Ok(Self::Parallel),
            "CONDITIONAL" => Ok(Self::Conditional),
            other => Err(ValidationError::InvalidId(format!(
                "unknown workflow type `{other}`"
            ))),
        }
    }
}

/// Discriminant of a [`StepConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Action,
    Trigger,
    Condition,
}

/// Typed configuration of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Action {
        action: ActionSpec,
    },
    /// Entry-point marker. Inert when reached inside a running workflow.
    Trigger {
        trigger_type: TriggerType,
    },
    /// Predicate over the run input. In a CONDITIONAL template the leading
    /// condition's branches name the steps to run.
    Condition {
        condition: Condition,
        #[serde(default)]
        then_steps: Vec<StepId>,
        #[serde(default)]
        else_steps: Vec<StepId>,
    },
}

/// One node of a workflow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub id: StepId,
    pub name: String,
    pub config: StepConfig,
}

impl WorkflowStep {
    #[must_use]
    pub fn action(name: impl Into<String>, action: ActionSpec) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            config: StepConfig::Action { action },
        }
    }

    #[must_use]
    pub fn trigger(name: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            config: StepConfig::Trigger { trigger_type },
        }
    }

    #[must_use]
    pub fn condition(
        name: impl Into<String>,
        condition: Condition,
        then_steps: Vec<StepId>,
        else_steps: Vec<StepId>,
    ) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            config: StepConfig::Condition {
                condition,
                then_steps,
                else_steps,
            },
        }
    }

    #[must_use]
    pub fn step_type(&self) -> StepType {
        match self.config {
            StepConfig::Action { .. } => StepType::Action,
            StepConfig::Trigger { .. } => StepType::Trigger,
            StepConfig::Condition { .. } => StepType::Condition,
        }
    }

    #[must_use]
    pub fn referenced_template(&self) -> Option<TemplateId> {
        match &self.config {
            StepConfig::Action { action } => action.referenced_template(),
            _ => None,
        }
    }
}

/// A named, typed graph of [`WorkflowStep`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowTemplate {
    /// Create a builder for constructing a [`WorkflowTemplate`].
    #[must_use]
    pub fn builder() -> WorkflowTemplateBuilder {
        WorkflowTemplateBuilder::default()
    }

    /// Templates referenced by `run_workflow` steps, in step order.
    pub fn referenced_templates(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.steps.iter().filter_map(WorkflowStep::referenced_template)
    }

    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Resolve the branch selected by a CONDITIONAL template's leading
    /// condition, in the order the branch lists them.
    #[must_use]
    pub fn branch(&self, outcome: bool) -> Vec<&WorkflowStep> {
        let Some(StepConfig::Condition {
            then_steps,
            else_steps,
            ..
        }) = self.steps.first().map(|s| &s.config)
        else {
            return Vec::new();
        };
        let ids = if outcome { then_steps } else { else_steps };
        ids.iter().filter_map(|id| self.step(*id)).collect()
    }

    /// Check structural invariants. Reference cycles need the other
    /// templates and are checked separately by [`check_references`].
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::Validation`] for an empty name, no steps,
    /// duplicate step ids, or blank action parameters, and
    /// [`AutoflowError::Configuration`] for malformed conditions, a
    /// CONDITIONAL template without a leading condition step, or branches
    /// naming unknown steps.
    pub fn validate(&self) -> Result<(), AutoflowError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps.into());
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen.insert(step.id) {
                return Err(ValidationError::DuplicateStepId(step.id.to_string()).into());
            }
        }

        for step in &self.steps {
            match &step.config {
                StepConfig::Action { action } => action.validate()?,
                StepConfig::Trigger { .. } => {}
                StepConfig::Condition {
                    condition,
                    then_steps,
                    else_steps,
                } => {
                    condition.validate()?;
                    if let Some(unknown) = then_steps
                        .iter()
                        .chain(else_steps)
                        .find(|id| !seen.contains(*id) || **id == step.id)
                    {
                        return Err(ConfigurationError::UnknownBranchStep(unknown.to_string()).into());
                    }
                }
            }
        }

        if self.kind == WorkflowKind::Conditional
            && self.steps[0].step_type() != StepType::Condition
        {
            return Err(ConfigurationError::MissingLeadingCondition.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`WorkflowTemplate`].
#[derive(Debug, Default)]
pub struct WorkflowTemplateBuilder {
    id: Option<TemplateId>,
    owner_id: Option<OwnerId>,
    name: Option<String>,
    description: Option<String>,
    kind: Option<WorkflowKind>,
    steps: Vec<WorkflowStep>,
    schedule: Option<Schedule>,
    created_at: Option<Timestamp>,
}

impl WorkflowTemplateBuilder {
    #[must_use]
    pub fn id(mut self, id: TemplateId) -> Self {
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
    pub fn kind(mut self, kind: WorkflowKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`WorkflowTemplate`].
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation reported by
    /// [`WorkflowTemplate::validate`].
    pub fn build(self) -> Result<WorkflowTemplate, AutoflowError> {
        let created_at = self.created_at.unwrap_or_else(now);
        let template = WorkflowTemplate {
            id: self.id.unwrap_or_default(),
            owner_id: self.owner_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            kind: self.kind.unwrap_or(WorkflowKind::Sequential),
            steps: self.steps,
            schedule: self.schedule,
            created_at,
            updated_at: created_at,
        };
        template.validate()?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify(message: &str) -> WorkflowStep {
        WorkflowStep::action(
            message,
            ActionSpec::SendNotification {
                recipient: "owner".into(),
                message: message.into(),
            },
        )
    }

    #[test]
    fn should_build_sequential_template_by_default() {
        let template = WorkflowTemplate::builder()
            .name("Onboarding")
            .step(notify("welcome"))
            .build()
            .unwrap();
        assert_eq!(template.kind, WorkflowKind::Sequential);
        assert_eq!(template.steps.len(), 1);
    }

    #[test]
    fn should_return_validation_error_when_no_steps() {
        let result = WorkflowTemplate::builder().name("Empty").build();
        assert!(matches!(
            result,
            Err(AutoflowError::Validation(ValidationError::NoSteps))
        ));
    }

    #[test]
    fn should_return_validation_error_when_step_ids_collide() {
        let step = notify("a");
        let result = WorkflowTemplate::builder()
            .name("Dup")
            .step(step.clone())
            .step(step)
            .build();
        assert!(matches!(
            result,
            Err(AutoflowError::Validation(ValidationError::DuplicateStepId(_)))
        ));
    }

    #[test]
    fn should_reject_conditional_template_without_leading_condition() {
        let result = WorkflowTemplate::builder()
            .name("Broken")
            .kind(WorkflowKind::Conditional)
            .step(notify("a"))
            .build();
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(
                ConfigurationError::MissingLeadingCondition
            ))
        ));
    }

    #[test]
    fn should_reject_branch_naming_unknown_step() {
        let result = WorkflowTemplate::builder()
            .name("Dangling")
            .kind(WorkflowKind::Conditional)
            .step(WorkflowStep::condition(
                "vip?",
                Condition::equals("tier", "vip"),
                vec![StepId::new()],
                vec![],
            ))
            .build();
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(
                ConfigurationError::UnknownBranchStep(_)
            ))
        ));
    }

    #[test]
    fn should_resolve_branches_in_declared_order() {
        let a = notify("a");
        let b = notify("b");
        let c = notify("c");
        let template = WorkflowTemplate::builder()
            .name("Branching")
            .kind(WorkflowKind::Conditional)
            .step(WorkflowStep::condition(
                "vip?",
                Condition::equals("tier", "vip"),
                vec![b.id, a.id],
                vec![c.id],
            ))
            .step(a.clone())
            .step(b.clone())
            .step(c.clone())
            .build()
            .unwrap();

        let then_ids: Vec<_> = template.branch(true).iter().map(|s| s.id).collect();
        let else_ids: Vec<_> = template.branch(false).iter().map(|s| s.id).collect();
        assert_eq!(then_ids, vec![b.id, a.id]);
        assert_eq!(else_ids, vec![c.id]);
    }

    #[test]
    fn should_list_sub_workflow_references() {
        let child = TemplateId::new();
        let template = WorkflowTemplate::builder()
            .name("Parent")
            .step(notify("a"))
            .step(WorkflowStep::action(
                "child",
                ActionSpec::RunWorkflow { template_id: child },
            ))
            .build()
            .unwrap();
        assert_eq!(template.referenced_templates().collect::<Vec<_>>(), vec![child]);
    }

    #[test]
    fn should_deserialize_template_from_json() {
        let json = serde_json::json!({
            "id": TemplateId::new(),
            "owner_id": OwnerId::new(),
            "name": "Follow-up",
            "type": "PARALLEL",
            "steps": [
                {"name": "ping", "config": {"type": "action", "action": {
                    "type": "send_notification", "recipient": "r", "message": "m"
                }}},
                {"name": "entry", "config": {"type": "trigger", "trigger_type": "client_created"}}
            ],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let template: WorkflowTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(template.kind, WorkflowKind::Parallel);
        assert_eq!(template.steps[1].step_type(), StepType::Trigger);
        assert!(template.validate().is_ok());
    }
}
