//! Workflow engine — executes rule action lists and workflow templates.
//!
//! Steps of SEQUENTIAL templates, CONDITIONAL branches and rule action
//! lists run one at a time; PARALLEL templates fan out onto tasks bounded
//! by a semaphore and fan back in before the outcome is resolved.
//! `run_workflow` actions execute the referenced template inline, keyed
//! below the calling step's path.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use autoflow_domain::error::{ActionError, ConfigurationError};
use autoflow_domain::id::{RunId, StepId, TemplateId};
use autoflow_domain::rule::{ActionSpec, AutomationRule, Condition};
use autoflow_domain::run::{RunFailure, RunStatus, StepPath, StepResult, StepStatus};
use autoflow_domain::time::now;
use autoflow_domain::workflow::{StepConfig, StepType, WorkflowKind, WorkflowTemplate};

use crate::executor::ActionExecutor;
use crate::handlers::ActionContext;
use crate::ports::WorkflowTemplateRepository;
use crate::settings::EngineSettings;

/// Collects top-level step results as they finish, so a run that blows
/// its budget can still be completed with what it did.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<StepResult>>>);

impl Recorder {
    fn push(&self, result: &StepResult) {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(result.clone());
    }

    /// Results recorded so far, ordered by step path.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StepResult> {
        let mut results = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        results.sort_by(|a, b| a.path.cmp(&b.path));
        results
    }
}

/// Per-run execution context shared by every step of the run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub run_id: RunId,
    pub correlation_id: String,
    pub payload: Arc<serde_json::Value>,
    recorder: Option<Recorder>,
}

impl Invocation {
    #[must_use]
    pub fn new(run_id: RunId, correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            run_id,
            correlation_id: correlation_id.into(),
            payload: Arc::new(payload),
            recorder: None,
        }
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    fn nested(&self) -> Self {
        Self {
            recorder: None,
            ..self.clone()
        }
    }

    fn record(&self, result: &StepResult) {
        if let Some(recorder) = &self.recorder {
            recorder.push(result);
        }
    }
}

/// Outcome of executing a rule or template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    fn new(mut steps: Vec<StepResult>, failure: Option<RunFailure>) -> Self {
        steps.sort_by(|a, b| a.path.cmp(&b.path));
        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::aggregate(&steps)
        };
        Self {
            status,
            steps,
            failure,
        }
    }
}

#[derive(Debug, Clone)]
enum Work {
    Action(ActionSpec),
    Trigger,
    Condition(Condition),
}

/// A step flattened out of a rule action list or a template.
#[derive(Debug, Clone)]
struct Planned {
    index: usize,
    step_id: Option<StepId>,
    name: String,
    work: Work,
}

impl Planned {
    fn from_template(index: usize, step: &autoflow_domain::workflow::WorkflowStep) -> Self {
        let work = match &step.config {
            StepConfig::Action { action } => Work::Action(action.clone()),
            StepConfig::Trigger { .. } => Work::Trigger,
            StepConfig::Condition { condition, .. } => Work::Condition(condition.clone()),
        };
        Self {
            index,
            step_id: Some(step.id),
            name: step.name.clone(),
            work,
        }
    }

    fn step_type(&self) -> StepType {
        match self.work {
            Work::Action(_) => StepType::Action,
            Work::Trigger => StepType::Trigger,
            Work::Condition(_) => StepType::Condition,
        }
    }

    fn path(&self, parent: Option<&StepPath>) -> StepPath {
        parent.map_or_else(|| StepPath::root(self.index), |p| p.child(self.index))
    }

    fn skipped(&self, parent: Option<&StepPath>) -> StepResult {
        StepResult::skipped(self.path(parent), self.step_id, &self.name, self.step_type())
    }
}

/// Result of one step plus an optional run-level failure it implies.
struct StepOutcome {
    result: StepResult,
    failure: Option<RunFailure>,
    /// A sequence must not continue past this step.
    halt: bool,
}

type BoxedReport<'a> = Pin<Box<dyn Future<Output = RunReport> + Send + 'a>>;

/// Executes rules and templates against an [`ActionExecutor`].
pub struct WorkflowEngine<W> {
    templates: Arc<W>,
    executor: ActionExecutor,
    settings: Arc<EngineSettings>,
}

impl<W> Clone for WorkflowEngine<W> {
    fn clone(&self) -> Self {
        Self {
            templates: Arc::clone(&self.templates),
            executor: self.executor.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<W> WorkflowEngine<W>
where
    W: WorkflowTemplateRepository + Send + Sync + 'static,
{
    pub fn new(templates: Arc<W>, executor: ActionExecutor, settings: Arc<EngineSettings>) -> Self {
        Self {
            templates,
            executor,
            settings,
        }
    }

    /// Run a rule's actions in list order.
    ///
    /// Fail-fast unless the rule opts into `continue_on_error`.
    #[tracing::instrument(skip(self, rule, invocation), fields(rule_id = %rule.id, run_id = %invocation.run_id))]
    pub async fn execute_rule(&self, rule: &AutomationRule, invocation: &Invocation) -> RunReport {
        let steps: Vec<_> = rule
            .actions
            .iter()
            .enumerate()
            .map(|(index, action)| Planned {
                index,
                step_id: None,
                name: action.action_type().to_string(),
                work: Work::Action(action.clone()),
            })
            .collect();
        let (results, failure) = self
            .run_sequence(&steps, None, rule.continue_on_error, invocation, 0)
            .await;
        RunReport::new(results, failure)
    }

    /// Run a template according to its kind.
    #[tracing::instrument(skip(self, template, invocation), fields(template_id = %template.id, run_id = %invocation.run_id))]
    pub async fn execute_template(
        &self,
        template: WorkflowTemplate,
        invocation: &Invocation,
    ) -> RunReport {
        self.run_template(Arc::new(template), None, invocation.clone(), 0)
            .await
    }

    fn run_template(
        &self,
        template: Arc<WorkflowTemplate>,
        parent: Option<StepPath>,
        invocation: Invocation,
        depth: usize,
    ) -> BoxedReport<'_> {
        Box::pin(async move {
            let steps: Vec<_> = template
                .steps
                .iter()
                .enumerate()
                .map(|(i, step)| Planned::from_template(i, step))
                .collect();
            let parent = parent.as_ref();
            let (results, failure) = match template.kind {
                WorkflowKind::Sequential => {
                    self.run_sequence(&steps, parent, false, &invocation, depth)
                        .await
                }
                WorkflowKind::Parallel => {
                    self.run_parallel(steps, parent, &invocation, depth).await
                }
                WorkflowKind::Conditional => {
                    self.run_conditional(&template, &steps, parent, &invocation, depth)
                        .await
                }
            };
            RunReport::new(results, failure)
        })
    }

    async fn run_conditional(
        &self,
        template: &WorkflowTemplate,
        steps: &[Planned],
        parent: Option<&StepPath>,
        invocation: &Invocation,
        depth: usize,
    ) -> (Vec<StepResult>, Option<RunFailure>) {
        let Some(head) = steps.first().filter(|s| matches!(s.work, Work::Condition(_))) else {
            let failure = RunFailure::Configuration {
                message: ConfigurationError::MissingLeadingCondition.to_string(),
            };
            return (Vec::new(), Some(failure));
        };
        let outcome = self.run_step(head, parent, invocation, depth).await;
        invocation.record(&outcome.result);
        let mut results = vec![outcome.result.clone()];
        if outcome.failure.is_some() {
            return (results, outcome.failure);
        }

        let taken = outcome.result.output.as_ref().and_then(|o| o["matched"].as_bool()) == Some(true);
        let branch: Vec<_> = template
            .branch(taken)
            .into_iter()
            .filter_map(|step| steps.iter().find(|p| p.step_id == Some(step.id)).cloned())
            .collect();
        tracing::debug!(taken, branch_len = branch.len(), "conditional branch selected");
        let (branch_results, failure) = self
            .run_sequence(&branch, parent, false, invocation, depth)
            .await;
        results.extend(branch_results);
        (results, failure)
    }

    async fn run_sequence(
        &self,
        steps: &[Planned],
        parent: Option<&StepPath>,
        continue_on_error: bool,
        invocation: &Invocation,
        depth: usize,
    ) -> (Vec<StepResult>, Option<RunFailure>) {
        let mut results = Vec::with_capacity(steps.len());
        let mut failure = None;
        let mut halted = false;
        for step in steps {
            let result = if halted {
                step.skipped(parent)
            } else {
                let outcome = self.run_step(step, parent, invocation, depth).await;
                let stop_on_failure = outcome.result.is_failed() && !continue_on_error;
                halted = outcome.halt || stop_on_failure || outcome.failure.is_some();
                failure = failure.or(outcome.failure);
                outcome.result
            };
            invocation.record(&result);
            results.push(result);
        }
        (results, failure)
    }

    async fn run_parallel(
        &self,
        steps: Vec<Planned>,
        parent: Option<&StepPath>,
        invocation: &Invocation,
        depth: usize,
    ) -> (Vec<StepResult>, Option<RunFailure>) {
        let pool = Arc::new(Semaphore::new(self.settings.max_parallel_steps.max(1)));
        let mut tasks = JoinSet::new();
        for step in steps.iter().cloned() {
            let engine = self.clone();
            let invocation = invocation.clone();
            let parent = parent.cloned();
            let pool = Arc::clone(&pool);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = pool.acquire_owned().await.ok();
                engine
                    .run_step(&step, parent.as_ref(), &invocation, depth)
                    .await
            });
        }

        let mut results = Vec::with_capacity(steps.len());
        let mut failure = None;
        let mut finished = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    invocation.record(&outcome.result);
                    finished.insert(outcome.result.path.clone());
                    failure = failure.or(outcome.failure);
                    results.push(outcome.result);
                }
                Err(err) => tracing::error!(error = %err, "parallel step task aborted"),
            }
        }
        for step in &steps {
            let path = step.path(parent);
            if !finished.contains(&path) {
                let mut result = step.skipped(parent);
                result.status = StepStatus::Failed;
                result.error = Some("step task aborted".to_string());
                invocation.record(&result);
                results.push(result);
            }
        }
        (results, failure)
    }

    async fn run_step(
        &self,
        step: &Planned,
        parent: Option<&StepPath>,
        invocation: &Invocation,
        depth: usize,
    ) -> StepOutcome {
        let path = step.path(parent);
        let mut result = step.skipped(parent);
        result.started_at = now();
        let mut failure = None;
        let mut halt = false;

        match &step.work {
            Work::Trigger => {
                tracing::debug!(step = %path, "trigger step reached mid-run, ignored");
                result.status = StepStatus::Succeeded;
            }
            Work::Condition(condition) => match condition.evaluate(&invocation.payload) {
                Ok(matched) => {
                    result.status = StepStatus::Succeeded;
                    result.output = Some(serde_json::json!({ "matched": matched }));
                    halt = !matched;
                }
                Err(err) => {
                    tracing::warn!(step = %path, error = %err, "malformed condition");
                    result.status = StepStatus::Failed;
                    result.error = Some(err.to_string());
                    failure = Some(RunFailure::Configuration {
                        message: err.to_string(),
                    });
                }
            },
            Work::Action(ActionSpec::RunWorkflow { template_id }) => {
                let (sub, sub_failure) = self
                    .run_sub_workflow(*template_id, &path, invocation, depth)
                    .await;
                result.status = if sub.status == RunStatus::Succeeded {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed
                };
                if result.status == StepStatus::Failed {
                    result.error = Some(
                        sub_failure
                            .as_ref()
                            .or(sub.failure.as_ref())
                            .map_or_else(|| format!("sub-workflow {}", sub.status), ToString::to_string),
                    );
                }
                result.attempts = 1;
                failure = sub_failure.or(sub.failure);
                result.children = sub.steps;
            }
            Work::Action(action) => {
                let ctx = ActionContext {
                    run_id: invocation.run_id,
                    path: path.clone(),
                    correlation_id: invocation.correlation_id.clone(),
                    payload: Arc::clone(&invocation.payload),
                    timeout: self.settings.default_action_timeout,
                };
                let outcome = self.executor.execute(action, &ctx).await;
                result.attempts = outcome.attempts;
                match outcome.result {
                    Ok(output) => {
                        result.status = StepStatus::Succeeded;
                        result.output = output;
                    }
                    Err(err) => {
                        result.status = StepStatus::Failed;
                        result.error = Some(err.to_string());
                        if let ActionError::Configuration(config) = err {
                            failure = Some(RunFailure::Configuration {
                                message: config.to_string(),
                            });
                        }
                    }
                }
            }
        }

        result.finished_at = now();
        StepOutcome {
            result,
            failure,
            halt,
        }
    }

    /// Execute a referenced template inline. A failure returned alongside
    /// the report is a configuration error of the reference itself.
    async fn run_sub_workflow(
        &self,
        template_id: TemplateId,
        path: &StepPath,
        invocation: &Invocation,
        depth: usize,
    ) -> (RunReport, Option<RunFailure>) {
        let config_failure = |err: ConfigurationError| {
            tracing::warn!(%template_id, error = %err, "sub-workflow rejected");
            (
                RunReport::new(Vec::new(), None),
                Some(RunFailure::Configuration {
                    message: err.to_string(),
                }),
            )
        };
        if depth + 1 > self.settings.max_workflow_depth {
            return config_failure(ConfigurationError::DepthExceeded(
                self.settings.max_workflow_depth,
            ));
        }
        let template = match self.templates.get(template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                return config_failure(ConfigurationError::UnknownTemplate(
                    template_id.to_string(),
                ));
            }
            Err(err) => {
                tracing::error!(%template_id, error = %err, "failed to load sub-workflow");
                let mut report = RunReport::new(Vec::new(), None);
                report.status = RunStatus::Failed;
                return (report, None);
            }
        };
        let report = self
            .run_template(
                Arc::new(template),
                Some(path.clone()),
                invocation.nested(),
                depth + 1,
            )
            .await;
        (report, None)
    }
}
