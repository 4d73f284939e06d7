//! Shared application state for axum handlers.

use std::sync::Arc;

use autoflow_app::automation_engine::AutomationEngine;
use autoflow_app::event_bus::InProcessEventBus;
use autoflow_app::services::rule_service::RuleService;
use autoflow_app::services::workflow_service::WorkflowService;
use autoflow_domain::event::Notice;

/// Rule service over shared repositories.
pub type SharedRuleService<R, W, P> = RuleService<Arc<R>, Arc<W>, Arc<P>>;

/// Workflow service over shared repositories.
pub type SharedWorkflowService<R, W, P> = WorkflowService<Arc<W>, Arc<R>, Arc<P>>;

/// Application state shared across all axum handlers.
///
/// Generic over the rule repository `R`, template repository `W`, run
/// ledger `L`, notice publisher `P` and event sink `S` to avoid dynamic
/// dispatch. `Clone` is implemented manually so the underlying types do not
/// need to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<R, W, L, P, S> {
    /// Runs rules and templates, answers run queries.
    pub engine: Arc<AutomationEngine<R, W, L, P>>,
    pub rule_service: Arc<SharedRuleService<R, W, P>>,
    pub workflow_service: Arc<SharedWorkflowService<R, W, P>>,
    /// Where ingested events are handed over for dispatch.
    pub events: Arc<S>,
    /// Source of the realtime notice stream.
    pub notices: Arc<InProcessEventBus<Notice>>,
}

impl<R, W, L, P, S> Clone for AppState<R, W, L, P, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            rule_service: Arc::clone(&self.rule_service),
            workflow_service: Arc::clone(&self.workflow_service),
            events: Arc::clone(&self.events),
            notices: Arc::clone(&self.notices),
        }
    }
}

impl<R, W, L, P, S> AppState<R, W, L, P, S> {
    /// Create a new application state from pre-wrapped `Arc` services.
    ///
    /// The engine is shared with the dispatcher and scheduler tasks, so the
    /// caller builds it first and hands a clone here.
    pub fn new(
        engine: Arc<AutomationEngine<R, W, L, P>>,
        rule_service: Arc<SharedRuleService<R, W, P>>,
        workflow_service: Arc<SharedWorkflowService<R, W, P>>,
        events: Arc<S>,
        notices: Arc<InProcessEventBus<Notice>>,
    ) -> Self {
        Self {
            engine,
            rule_service,
            workflow_service,
            events,
            notices,
        }
    }
}
