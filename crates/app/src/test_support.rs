//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use autoflow_domain::error::{ActionError, AutoflowError};
use autoflow_domain::event::Notice;
use autoflow_domain::id::{RuleId, TemplateId};
use autoflow_domain::rule::{AutomationRule, RuleStatus, TriggerType};
use autoflow_domain::workflow::WorkflowTemplate;

use crate::handlers::HandlerRegistry;
use crate::ports::{
    DocumentService, EmailService, NewTask, NoticePublisher, NotificationService, RuleRepository,
    StatusService, TaskService, TextGenerationService, WorkflowTemplateRepository,
};

#[derive(Default)]
pub struct InMemoryRuleRepo {
    store: Mutex<HashMap<RuleId, AutomationRule>>,
}

impl InMemoryRuleRepo {
    pub fn with(rules: Vec<AutomationRule>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(rules.into_iter().map(|r| (r.id, r)).collect()),
        })
    }
}

impl RuleRepository for InMemoryRuleRepo {
    fn save(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, AutoflowError>> + Send {
        self.store.lock().unwrap().insert(rule.id, rule.clone());
        async { Ok(rule) }
    }

    fn get(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, AutoflowError>> + Send {
        let r = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(r) }
    }

    fn list(&self) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send {
        let mut r: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status != RuleStatus::Deleted)
            .cloned()
            .collect();
        r.sort_by_key(|r| (r.created_at, r.id));
        async { Ok(r) }
    }

    fn list_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send {
        let r: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_active() && r.trigger_type == trigger_type)
            .cloned()
            .collect();
        async { Ok(r) }
    }
}

#[derive(Default)]
pub struct InMemoryTemplateRepo {
    store: Mutex<HashMap<TemplateId, WorkflowTemplate>>,
}

impl InMemoryTemplateRepo {
    pub fn with(templates: Vec<WorkflowTemplate>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(templates.into_iter().map(|t| (t.id, t)).collect()),
        })
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }
}

impl WorkflowTemplateRepository for InMemoryTemplateRepo {
    fn save(
        &self,
        template: WorkflowTemplate,
    ) -> impl Future<Output = Result<WorkflowTemplate, AutoflowError>> + Send {
        self.store
            .lock()
            .unwrap()
            .insert(template.id, template.clone());
        async { Ok(template) }
    }

    fn get(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<WorkflowTemplate>, AutoflowError>> + Send {
        let r = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(r) }
    }

    fn list(&self) -> impl Future<Output = Result<Vec<WorkflowTemplate>, AutoflowError>> + Send {
        let mut r: Vec<_> = self.store.lock().unwrap().values().cloned().collect();
        r.sort_by_key(|t| (t.created_at, t.id));
        async { Ok(r) }
    }

    fn delete(&self, id: TemplateId) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        self.store.lock().unwrap().remove(&id);
        async { Ok(()) }
    }
}

/// Collects every published notice.
#[derive(Default)]
pub struct SpyPublisher {
    notices: Mutex<Vec<Notice>>,
}

impl SpyPublisher {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NoticePublisher for SpyPublisher {
    fn publish(&self, notice: Notice) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        self.notices.lock().unwrap().push(notice);
        async { Ok(()) }
    }
}

/// Records `(kind, idempotency key)` of every collaborator call.
///
/// While `gate` has no permits, notification calls block; tests use it to
/// keep a run in flight.
#[derive(Default)]
pub struct FakeCollaborators {
    calls: Mutex<Vec<(String, String)>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeCollaborators {
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::default(),
            gate: Some(gate),
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, key: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((kind.to_string(), key.to_string()));
    }

    /// Registry with every standard handler backed by `collaborators`.
    pub fn registry(collaborators: &Arc<Self>) -> HandlerRegistry {
        HandlerRegistry::standard(
            Arc::clone(collaborators),
            Arc::clone(collaborators),
            Arc::clone(collaborators),
            Arc::clone(collaborators),
            Arc::clone(collaborators),
            Arc::clone(collaborators),
        )
    }
}

impl NotificationService for Arc<FakeCollaborators> {
    fn send(
        &self,
        _recipient: &str,
        _message: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send {
        let this = Arc::clone(self);
        let key = idempotency_key.to_string();
        async move {
            if let Some(gate) = &this.gate {
                let _permit = gate.acquire().await;
            }
            this.record("notification", &key);
            Ok(())
        }
    }
}

impl EmailService for Arc<FakeCollaborators> {
    fn send(
        &self,
        _to: &str,
        _subject: &str,
        _body: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send {
        self.record("email", idempotency_key);
        async { Ok(()) }
    }
}

impl TaskService for Arc<FakeCollaborators> {
    fn create(
        &self,
        task: NewTask,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<String, ActionError>> + Send {
        self.record("task", idempotency_key);
        async move { Ok(format!("task-{}", task.title)) }
    }
}

impl DocumentService for Arc<FakeCollaborators> {
    fn create(
        &self,
        title: &str,
        _content: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<String, ActionError>> + Send {
        self.record("document", idempotency_key);
        let id = format!("doc-{title}");
        async move { Ok(id) }
    }
}

impl StatusService for Arc<FakeCollaborators> {
    fn update(
        &self,
        _entity: &str,
        _entity_id: &str,
        _field: &str,
        _value: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send {
        self.record("status", idempotency_key);
        async { Ok(()) }
    }
}

impl TextGenerationService for Arc<FakeCollaborators> {
    fn generate(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> impl Future<Output = Result<String, ActionError>> + Send {
        self.record("ai", prompt);
        async { Ok("generated".to_string()) }
    }
}
