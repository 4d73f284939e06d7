//! In-memory repositories and a fully wired state for router tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use autoflow_adapter_virtual::VirtualCollaborators;
use autoflow_app::automation_engine::AutomationEngine;
use autoflow_app::event_bus::InProcessEventBus;
use autoflow_app::event_queue::InProcessEventQueue;
use autoflow_app::ledger::InMemoryRunLedger;
use autoflow_app::ports::{RuleRepository, WorkflowTemplateRepository};
use autoflow_app::services::rule_service::RuleService;
use autoflow_app::services::workflow_service::WorkflowService;
use autoflow_app::settings::EngineSettings;
use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Notice;
use autoflow_domain::id::{RuleId, TemplateId};
use autoflow_domain::rule::{AutomationRule, RuleStatus, TriggerType};
use autoflow_domain::workflow::WorkflowTemplate;

use crate::state::AppState;

#[derive(Default)]
pub struct MemoryRules(Mutex<HashMap<RuleId, AutomationRule>>);

impl RuleRepository for MemoryRules {
    async fn save(&self, rule: AutomationRule) -> Result<AutomationRule, AutoflowError> {
        self.0.lock().unwrap().insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn get(&self, id: RuleId) -> Result<Option<AutomationRule>, AutoflowError> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<AutomationRule>, AutoflowError> {
        let mut rules: Vec<_> = self
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status != RuleStatus::Deleted)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.created_at, r.id));
        Ok(rules)
    }

    async fn list_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<AutomationRule>, AutoflowError> {
        let mut rules = self.list().await?;
        rules.retain(|r| r.is_active() && r.trigger_type == trigger_type);
        Ok(rules)
    }
}

#[derive(Default)]
pub struct MemoryTemplates(Mutex<HashMap<TemplateId, WorkflowTemplate>>);

impl WorkflowTemplateRepository for MemoryTemplates {
    async fn save(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate, AutoflowError> {
        self.0.lock().unwrap().insert(template.id, template.clone());
        Ok(template)
    }

    async fn get(&self, id: TemplateId) -> Result<Option<WorkflowTemplate>, AutoflowError> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowTemplate>, AutoflowError> {
        let mut templates: Vec<_> = self.0.lock().unwrap().values().cloned().collect();
        templates.sort_by_key(|t| (t.created_at, t.id));
        Ok(templates)
    }

    async fn delete(&self, id: TemplateId) -> Result<(), AutoflowError> {
        self.0.lock().unwrap().remove(&id);
        Ok(())
    }
}

pub type TestState = AppState<
    MemoryRules,
    MemoryTemplates,
    InMemoryRunLedger,
    InProcessEventBus<Notice>,
    InProcessEventQueue,
>;

pub struct Harness {
    pub state: TestState,
    pub collaborators: VirtualCollaborators,
    pub events: Arc<InProcessEventQueue>,
    pub notices: Arc<InProcessEventBus<Notice>>,
}

pub fn harness() -> Harness {
    harness_with_queue(16)
}

pub fn harness_with_queue(capacity: usize) -> Harness {
    let rules = Arc::new(MemoryRules::default());
    let templates = Arc::new(MemoryTemplates::default());
    let ledger = Arc::new(InMemoryRunLedger::new());
    let notices = Arc::new(InProcessEventBus::<Notice>::new(16));
    let events = Arc::new(InProcessEventQueue::new(capacity));
    let collaborators = VirtualCollaborators::default();

    let engine = Arc::new(AutomationEngine::new(
        Arc::clone(&rules),
        Arc::clone(&templates),
        ledger,
        Arc::clone(&notices),
        collaborators.registry(),
        EngineSettings::default(),
    ));
    let rule_service = Arc::new(RuleService::new(
        Arc::clone(&rules),
        Arc::clone(&templates),
        Arc::clone(&notices),
    ));
    let workflow_service = Arc::new(WorkflowService::new(
        templates,
        rules,
        Arc::clone(&notices),
    ));

    Harness {
        state: AppState::new(
            engine,
            rule_service,
            workflow_service,
            Arc::clone(&events),
            Arc::clone(&notices),
        ),
        collaborators,
        events,
        notices,
    }
}
