//! Automation engine — the programmatic surface of the system.
//!
//! For each incoming event the engine asks the [`TriggerMatcher`] for the
//! matching rules, registers one run per rule in the run ledger and drives
//! it through the [`WorkflowEngine`] to a terminal state. Duplicate
//! deliveries collapse on the ledger and are discarded without side
//! effects. Rules and templates can also be run directly.

use std::sync::Arc;

use serde::Serialize;

use autoflow_domain::error::{AutoflowError, NotFoundError};
use autoflow_domain::event::{DedupKey, Event, Notice, NoticeKind};
use autoflow_domain::id::{RuleId, RunId, TemplateId};
use autoflow_domain::rule::{AutomationRule, RuleStatus};
use autoflow_domain::run::{ExecutionRun, RunFailure, RunOwner, RunStatus};
use autoflow_domain::time::Timestamp;
use autoflow_domain::workflow::WorkflowTemplate;

use crate::executor::ActionExecutor;
use crate::handlers::HandlerRegistry;
use crate::matcher::{TriggerMatcher, admits};
use crate::ports::{NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository};
use crate::settings::EngineSettings;
use crate::workflow_engine::{Invocation, Recorder, RunReport, WorkflowEngine};

/// What happened to one matched rule of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Dispatch {
    /// The rule ran to a terminal state.
    Completed { run: ExecutionRun },
    /// A run for the same rule and dedup key was already in flight.
    Duplicate { rule_id: RuleId, existing_run: String },
    /// The ledger could not register or finish the rule's run.
    Failed { rule_id: RuleId, error: String },
}

enum Target {
    Rule(AutomationRule),
    Template(WorkflowTemplate),
}

/// Matches events to rules and runs rules and templates under the ledger.
pub struct AutomationEngine<R, W, L, P> {
    matcher: TriggerMatcher<Arc<R>>,
    rules: Arc<R>,
    templates: Arc<W>,
    ledger: Arc<L>,
    publisher: Arc<P>,
    workflows: WorkflowEngine<W>,
    settings: Arc<EngineSettings>,
}

impl<R, W, L, P> AutomationEngine<R, W, L, P>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync,
    P: NoticePublisher + Send + Sync,
{
    /// Create a new engine dispatching actions through `registry`.
    pub fn new(
        rules: Arc<R>,
        templates: Arc<W>,
        ledger: Arc<L>,
        publisher: Arc<P>,
        registry: HandlerRegistry,
        settings: EngineSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let executor = ActionExecutor::new(registry, Arc::clone(&settings));
        let workflows = WorkflowEngine::new(Arc::clone(&templates), executor, Arc::clone(&settings));
        Self {
            matcher: TriggerMatcher::new(Arc::clone(&rules)),
            rules,
            templates,
            ledger,
            publisher,
            workflows,
            settings,
        }
    }

    /// Run every rule matching `event`, in matcher order.
    ///
    /// A rule whose run is already in flight for the event's dedup key is
    /// reported as [`Dispatch::Duplicate`] and not executed again. A ledger
    /// error on one rule is reported as [`Dispatch::Failed`] and the
    /// remaining rules still run.
    ///
    /// # Errors
    ///
    /// Returns a storage error if loading rules fails.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type, dedup_key = %event.dedup_key))]
    pub async fn process_event(&self, event: &Event) -> Result<Vec<Dispatch>, AutoflowError> {
        let matched = self.matcher.match_event(event).await?;
        let mut dispatches = Vec::with_capacity(matched.len());
        for rule in matched {
            let rule_id = rule.id;
            let outcome = match self
                .start(RunOwner::Rule(rule_id), event.dedup_key.clone())
                .await
            {
                Ok(run) => {
                    self.drive(run, Target::Rule(rule), event.payload.clone(), event.id.to_string())
                        .await
                }
                Err(err) => Err(err),
            };
            dispatches.push(match outcome {
                Ok(run) => Dispatch::Completed { run },
                Err(AutoflowError::DuplicateRun(dup)) => {
                    tracing::warn!(%rule_id, existing_run = %dup.existing_run, "duplicate delivery discarded");
                    Dispatch::Duplicate {
                        rule_id,
                        existing_run: dup.existing_run,
                    }
                }
                Err(err) => {
                    tracing::error!(%rule_id, error = %err, "rule run could not be recorded");
                    Dispatch::Failed {
                        rule_id,
                        error: err.to_string(),
                    }
                }
            });
        }
        Ok(dispatches)
    }

    /// Fire one slot of a scheduled rule.
    ///
    /// The slot runs only when the rule's owner scope and conditions hold
    /// for `event`; otherwise `Ok(None)` is returned and nothing is
    /// ledgered.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::DuplicateRun`] when the slot already has a
    /// run, or a storage error from the ledger.
    #[tracing::instrument(skip(self, rule, event), fields(rule_id = %rule.id, dedup_key = %event.dedup_key))]
    pub async fn fire_scheduled_rule(
        &self,
        rule: AutomationRule,
        event: Event,
    ) -> Result<Option<ExecutionRun>, AutoflowError> {
        if !admits(&rule, &event) {
            tracing::debug!("conditions do not hold, slot skipped");
            return Ok(None);
        }
        let run = self
            .start(RunOwner::Rule(rule.id), event.dedup_key.clone())
            .await?;
        self.drive(run, Target::Rule(rule), event.payload, event.id.to_string())
            .await
            .map(Some)
    }

    /// Run a rule against `event` regardless of its trigger type and
    /// conditions.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown or deleted rules and
    /// [`AutoflowError::DuplicateRun`] when a run for the same key is in
    /// flight.
    #[tracing::instrument(skip(self, event), fields(dedup_key = %event.dedup_key))]
    pub async fn run_rule(
        &self,
        rule_id: RuleId,
        event: Event,
    ) -> Result<ExecutionRun, AutoflowError> {
        let rule = self
            .rules
            .get(rule_id)
            .await?
            .filter(|rule| rule.status != RuleStatus::Deleted)
            .ok_or_else(|| NotFoundError {
                entity: "AutomationRule",
                id: rule_id.to_string(),
            })?;
        let run = self
            .start(RunOwner::Rule(rule_id), event.dedup_key.clone())
            .await?;
        self.drive(run, Target::Rule(rule), event.payload, event.id.to_string())
            .await
    }

    /// Run a template once with `input` as its payload.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown templates.
    pub async fn run_workflow(
        &self,
        template_id: TemplateId,
        input: serde_json::Value,
    ) -> Result<ExecutionRun, AutoflowError> {
        self.run_workflow_keyed(template_id, input, DedupKey::manual())
            .await
    }

    /// Run a template under an explicit dedup key.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown templates and
    /// [`AutoflowError::DuplicateRun`] when a run for the same key is in
    /// flight.
    #[tracing::instrument(skip(self, input))]
    pub async fn run_workflow_keyed(
        &self,
        template_id: TemplateId,
        input: serde_json::Value,
        dedup_key: DedupKey,
    ) -> Result<ExecutionRun, AutoflowError> {
        let template = self
            .templates
            .get(template_id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "WorkflowTemplate",
                id: template_id.to_string(),
            })?;
        let correlation_id = dedup_key.to_string();
        let run = self.start(RunOwner::Template(template_id), dedup_key).await?;
        self.drive(run, Target::Template(template), input, correlation_id)
            .await
    }

    /// Current state of a run, with per-step detail.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] when no run with `run_id` exists.
    pub async fn get_run_status(&self, run_id: RunId) -> Result<ExecutionRun, AutoflowError> {
        self.ledger.get(run_id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "ExecutionRun",
                id: run_id.to_string(),
            }
            .into()
        })
    }

    /// Most recent runs first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the ledger.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<ExecutionRun>, AutoflowError> {
        self.ledger.list_recent(limit).await
    }

    /// Force runs past their deadline to `failed` and announce them.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the ledger.
    pub async fn expire_overdue(&self, now: Timestamp) -> Result<Vec<ExecutionRun>, AutoflowError> {
        let expired = self.ledger.expire_overdue(now).await?;
        for run in &expired {
            tracing::warn!(run_id = %run.id, owner = %run.owner, "run exceeded its budget, marked failed");
            self.announce(run).await;
        }
        Ok(expired)
    }

    async fn start(
        &self,
        owner: RunOwner,
        dedup_key: DedupKey,
    ) -> Result<ExecutionRun, AutoflowError> {
        self.ledger
            .begin(owner, dedup_key, self.settings.run_budget())
            .await
    }

    async fn drive(
        &self,
        run: ExecutionRun,
        target: Target,
        payload: serde_json::Value,
        correlation_id: String,
    ) -> Result<ExecutionRun, AutoflowError> {
        self.ledger.mark_running(run.id).await?;
        let recorder = Recorder::default();
        let invocation =
            Invocation::new(run.id, correlation_id, payload).with_recorder(recorder.clone());

        let execution = async {
            match target {
                Target::Rule(rule) => self.workflows.execute_rule(&rule, &invocation).await,
                Target::Template(template) => {
                    self.workflows.execute_template(template, &invocation).await
                }
            }
        };
        let budget = self.settings.max_run_duration();
        let report = match tokio::time::timeout(budget, execution).await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!(run_id = %run.id, ?budget, "run timed out");
                RunReport {
                    status: RunStatus::Failed,
                    steps: recorder.snapshot(),
                    failure: Some(RunFailure::RunTimedOut {
                        budget_secs: budget.as_secs(),
                    }),
                }
            }
        };

        let finished = match self
            .ledger
            .complete(run.id, report.status, report.steps, report.failure)
            .await
        {
            Ok(finished) => finished,
            // Reaped as overdue while still executing.
            Err(AutoflowError::Integrity(_)) => self.get_run_status(run.id).await?,
            Err(err) => return Err(err),
        };
        tracing::info!(
            run_id = %finished.id,
            owner = %finished.owner,
            status = %finished.status,
            steps = finished.step_results.len(),
            "run completed"
        );
        self.announce(&finished).await;
        Ok(finished)
    }

    async fn announce(&self, run: &ExecutionRun) {
        let notice = Notice::new(
            NoticeKind::RunCompleted,
            serde_json::json!({
                "run_id": run.id,
                "owner": run.owner,
                "status": run.status,
                "dedup_key": run.dedup_key,
            }),
        );
        let _ = self.publisher.publish(notice).await;
    }
}
