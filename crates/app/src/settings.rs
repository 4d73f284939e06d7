//! Engine tuning knobs, filled from the daemon configuration.

use std::collections::HashMap;
use std::time::Duration;

use autoflow_domain::rule::ActionType;
use autoflow_domain::run::MAX_RUN_BUDGET_SECS;

/// Limits and timeouts applied by the executor and workflow engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on concurrently running steps of one PARALLEL template.
    pub max_parallel_steps: usize,
    /// Wall-clock budget of a single run.
    pub max_run_duration: Duration,
    /// Per-call timeout for action handlers without a specific override.
    pub default_action_timeout: Duration,
    /// Per-call timeout for `invoke_ai`, unless the action overrides it.
    pub ai_timeout: Duration,
    /// Per-action-type overrides of [`default_action_timeout`](Self::default_action_timeout).
    pub action_timeouts: HashMap<ActionType, Duration>,
    /// Attempts per action, first call included.
    pub max_action_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Maximum nesting of inline sub-workflows.
    pub max_workflow_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel_steps: 8,
            max_run_duration: Duration::from_secs(300),
            default_action_timeout: Duration::from_secs(5),
            ai_timeout: Duration::from_secs(30),
            action_timeouts: HashMap::new(),
            max_action_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            max_workflow_depth: 8,
        }
    }
}

impl EngineSettings {
    /// Timeout for one call of a handler of `action_type`.
    #[must_use]
    pub fn timeout_for(&self, action_type: ActionType) -> Duration {
        if let Some(timeout) = self.action_timeouts.get(&action_type) {
            return *timeout;
        }
        match action_type {
            ActionType::InvokeAi => self.ai_timeout,
            _ => self.default_action_timeout,
        }
    }

    /// Wall-clock budget of a run, capped at [`MAX_RUN_BUDGET_SECS`].
    #[must_use]
    pub fn max_run_duration(&self) -> Duration {
        self.max_run_duration
            .min(Duration::from_secs(MAX_RUN_BUDGET_SECS))
    }

    /// Run budget as a chrono duration for ledger deadlines.
    #[must_use]
    pub fn run_budget(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.max_run_duration()).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
