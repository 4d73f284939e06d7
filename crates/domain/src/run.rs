//! Execution runs — one ledgered invocation of a rule or template.
//!
//! A run moves `pending → running → {succeeded | failed | partially_failed}`.
//! Terminal runs are immutable; the ledger enforces that at most one
//! non-terminal run exists per `(owner, dedup_key)`, and at most one run of
//! any status for a scheduled-slot key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IntegrityViolation, ValidationError};
use crate::event::DedupKey;
use crate::id::{RuleId, RunId, StepId, TemplateId};
use crate::time::{Timestamp, now};
use crate::workflow::StepType;

/// What a run executes. Always exactly one rule or one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RunOwner {
    Rule(RuleId),
    Template(TemplateId),
}

impl RunOwner {
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            Self::Rule(_) => "rule",
            Self::Template(_) => "template",
        }
    }

    #[must_use]
    pub fn id(self) -> uuid::Uuid {
        match self {
            Self::Rule(id) => id.as_uuid(),
            Self::Template(id) => id.as_uuid(),
        }
    }

    /// Rebuild an owner from its stored `(kind, id)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidId`] for an unknown kind or a
    /// malformed id.
    pub fn parse(kind: &str, id: &str) -> Result<Self, ValidationError> {
        let uuid = uuid::Uuid::parse_str(id)
            .map_err(|err| ValidationError::InvalidId(format!("{id}: {err}")))?;
        match kind {
            "rule" => Ok(Self::Rule(RuleId::from_uuid(uuid))),
            "template" => Ok(Self::Template(TemplateId::from_uuid(uuid))),
            other => Err(ValidationError::InvalidId(format!(
                "unknown run owner kind `{other}`"
            ))),
        }
    }
}

impl fmt::Display for RunOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    PartiallyFailed,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::PartiallyFailed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially_failed",
        }
    }

    /// Aggregate per-step outcomes into a run status.
    ///
    /// Only action steps count. No failures is `succeeded`. Failures where
    /// every action ran and failed is `failed`. Anything else, including a
    /// fail-fast abort that skipped later actions, is `partially_failed`.
    #[must_use]
    pub fn aggregate(results: &[StepResult]) -> Self {
        let (mut succeeded, mut failed, mut skipped) = (0usize, 0usize, 0usize);
        for result in results.iter().filter(|r| r.step_type == StepType::Action) {
            match result.status {
                StepStatus::Succeeded => succeeded += 1,
                StepStatus::Failed => failed += 1,
                StepStatus::Skipped => skipped += 1,
            }
        }
        match (succeeded, failed, skipped) {
            (_, 0, _) => Self::Succeeded,
            (0, _, 0) => Self::Failed,
            _ => Self::PartiallyFailed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "partially_failed" => Ok(Self::PartiallyFailed),
            other => Err(ValidationError::InvalidId(format!(
                "unknown run status `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Position of a step inside a run: top-level index, then one index per
/// level of sub-workflow nesting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepPath(Vec<usize>);

impl StepPath {
    #[must_use]
    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Idempotency key handed to external collaborators: `runId:path`.
    #[must_use]
    pub fn idempotency_key(&self, run_id: RunId) -> String {
        format!("{run_id}:{self}")
    }
}

impl fmt::Display for StepPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Outcome of one step (or one rule action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub path: StepPath,
    /// Template step id; `None` for rule actions.
    #[serde(default)]
    pub step_id: Option<StepId>,
    pub name: String,
    pub step_type: StepType,
    pub status: StepStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Number of handler invocations, including retries.
    #[serde(default)]
    pub attempts: u32,
    /// Handler output, e.g. a created task id or generated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Results of an inline sub-workflow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepResult>,
}

impl StepResult {
    /// A step that was never started.
    #[must_use]
    pub fn skipped(
        path: StepPath,
        step_id: Option<StepId>,
        name: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        let at = now();
        Self {
            path,
            step_id,
            name: name.into(),
            step_type,
            status: StepStatus::Skipped,
            error: None,
            attempts: 0,
            output: None,
            started_at: at,
            finished_at: at,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Why a run ended `failed` without (only) step failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// The run exceeded its wall-clock budget and was force-completed.
    RunTimedOut { budget_secs: u64 },
    /// A static authoring error surfaced at execution time.
    Configuration { message: String },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunTimedOut { budget_secs } => {
                write!(f, "run timed out after {budget_secs}s")
            }
            Self::Configuration { message } => write!(f, "configuration error: {message}"),
        }
    }
}

/// Longest wall-clock budget a run may be given: one week.
pub const MAX_RUN_BUDGET_SECS: u64 = 7 * 24 * 60 * 60;

fn max_run_budget() -> chrono::Duration {
    chrono::Duration::seconds(MAX_RUN_BUDGET_SECS.cast_signed())
}

/// One concrete, ledgered invocation of a rule or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub id: RunId,
    pub owner: RunOwner,
    pub dedup_key: DedupKey,
    pub status: RunStatus,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default)]
    pub failure: Option<RunFailure>,
    pub started_at: Timestamp,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    /// Past this instant a non-terminal run is forced to `failed`.
    pub deadline: Timestamp,
}

impl ExecutionRun {
    /// A freshly registered run. The budget is capped at
    /// [`MAX_RUN_BUDGET_SECS`].
    #[must_use]
    pub fn pending(owner: RunOwner, dedup_key: DedupKey, budget: chrono::Duration) -> Self {
        let started_at = now();
        let budget = budget.clamp(chrono::Duration::zero(), max_run_budget());
        let deadline = started_at
            .checked_add_signed(budget)
            .unwrap_or(started_at);
        Self {
            id: RunId::new(),
            owner,
            dedup_key,
            status: RunStatus::Pending,
            step_results: Vec::new(),
            failure: None,
            started_at,
            finished_at: None,
            deadline,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub fn is_overdue(&self, at: Timestamp) -> bool {
        !self.is_terminal() && at > self.deadline
    }

    /// `pending → running`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityViolation::RunAlreadyTerminal`] for finished runs.
    pub fn start(&mut self) -> Result<(), IntegrityViolation> {
        self.ensure_open()?;
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Move to a terminal status.
    ///
    /// A non-terminal `status` is coerced through [`RunStatus::aggregate`].
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityViolation::RunAlreadyTerminal`] when the run has
    /// already completed.
    pub fn complete(
        &mut self,
        status: RunStatus,
        step_results: Vec<StepResult>,
        failure: Option<RunFailure>,
    ) -> Result<(), IntegrityViolation> {
        self.ensure_open()?;
        self.status = if status.is_terminal() {
            status
        } else {
            RunStatus::aggregate(&step_results)
        };
        self.step_results = step_results;
        self.failure = failure;
        self.finished_at = Some(now());
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), IntegrityViolation> {
        if self.is_terminal() {
            return Err(IntegrityViolation::RunAlreadyTerminal(self.id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: StepStatus, step_type: StepType) -> StepResult {
        let mut r = StepResult::skipped(StepPath::root(0), None, "s", step_type);
        r.status = status;
        r
    }

    fn action(status: StepStatus) -> StepResult {
        result(status, StepType::Action)
    }

    #[test]
    fn should_aggregate_to_succeeded_when_nothing_failed() {
        let results = [action(StepStatus::Succeeded), action(StepStatus::Skipped)];
        assert_eq!(RunStatus::aggregate(&results), RunStatus::Succeeded);
        assert_eq!(RunStatus::aggregate(&[]), RunStatus::Succeeded);
    }

    #[test]
    fn should_aggregate_to_partially_failed_when_subset_failed() {
        let results = [
            action(StepStatus::Succeeded),
            action(StepStatus::Failed),
            action(StepStatus::Skipped),
        ];
        assert_eq!(RunStatus::aggregate(&results), RunStatus::PartiallyFailed);
    }

    #[test]
    fn should_aggregate_to_failed_when_no_action_succeeded() {
        let results = [
            result(StepStatus::Succeeded, StepType::Condition),
            action(StepStatus::Failed),
            action(StepStatus::Failed),
        ];
        assert_eq!(RunStatus::aggregate(&results), RunStatus::Failed);
    }

    #[test]
    fn should_aggregate_to_partially_failed_when_first_failure_skips_the_rest() {
        let results = [action(StepStatus::Failed), action(StepStatus::Skipped)];
        assert_eq!(RunStatus::aggregate(&results), RunStatus::PartiallyFailed);
    }

    #[test]
    fn should_clamp_deadline_when_budget_is_huge() {
        let run = ExecutionRun::pending(
            RunOwner::Rule(RuleId::new()),
            DedupKey::new("evt-1"),
            chrono::Duration::MAX,
        );
        let budget = run.deadline - run.started_at;
        assert_eq!(budget, chrono::Duration::seconds(MAX_RUN_BUDGET_SECS.cast_signed()));
        assert!(!run.is_overdue(now()));
    }

    #[test]
    fn should_render_nested_step_paths() {
        let run_id = RunId::new();
        let path = StepPath::root(2).child(0).child(1);
        assert_eq!(path.to_string(), "2.0.1");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.idempotency_key(run_id), format!("{run_id}:2.0.1"));
    }

    #[test]
    fn should_walk_run_lifecycle_and_freeze_when_terminal() {
        let mut run = ExecutionRun::pending(
            RunOwner::Rule(RuleId::new()),
            DedupKey::new("evt-1"),
            chrono::Duration::seconds(60),
        );
        assert_eq!(run.status, RunStatus::Pending);
        run.start().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        run.complete(RunStatus::Running, vec![action(StepStatus::Succeeded)], None)
            .unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.finished_at.is_some());
        assert!(matches!(
            run.complete(RunStatus::Failed, vec![], None),
            Err(IntegrityViolation::RunAlreadyTerminal(_))
        ));
        assert!(run.start().is_err());
    }

    #[test]
    fn should_report_overdue_only_while_open() {
        let mut run = ExecutionRun::pending(
            RunOwner::Template(TemplateId::new()),
            DedupKey::manual(),
            chrono::Duration::seconds(1),
        );
        let later = run.deadline + chrono::Duration::seconds(1);
        assert!(run.is_overdue(later));
        run.complete(RunStatus::Succeeded, vec![], None).unwrap();
        assert!(!run.is_overdue(later));
    }

    #[test]
    fn should_parse_owner_from_stored_pair() {
        let id = RuleId::new();
        let owner = RunOwner::parse("rule", &id.to_string()).unwrap();
        assert_eq!(owner, RunOwner::Rule(id));
        assert!(RunOwner::parse("robot", &id.to_string()).is_err());
        assert_eq!(owner.to_string(), format!("rule:{id}"));
    }

    #[test]
    fn should_serialize_owner_as_tagged_pair() {
        let id = TemplateId::new();
        let json = serde_json::to_value(RunOwner::Template(id)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "template", "id": id}));
    }
}
