//! Action handlers and the registry the executor dispatches through.
//!
//! Handlers are trait objects so that a registry can hold one per action
//! type and tests can substitute fakes per run. The standard handlers wrap
//! the collaborator ports and forward the step's idempotency key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use autoflow_domain::error::ActionError;
use autoflow_domain::id::RunId;
use autoflow_domain::rule::{ActionSpec, ActionType};
use autoflow_domain::run::StepPath;

use crate::ports::{
    DocumentService, EmailService, NewTask, NotificationService, StatusService, TaskService,
    TextGenerationService,
};

/// Everything a handler may know about the call it serves.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: RunId,
    pub path: StepPath,
    /// Propagated to external services for log correlation.
    pub correlation_id: String,
    /// Triggering event payload, or the run input for manual runs.
    pub payload: Arc<serde_json::Value>,
    /// Budget of this call.
    pub timeout: Duration,
}

impl ActionContext {
    /// `runId:stepPath`, stable across retries of the same step.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        self.path.idempotency_key(self.run_id)
    }
}

/// Executes one action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Whether a failed call may be repeated with the same idempotency key.
    fn retryable(&self) -> bool {
        true
    }

    /// Perform the side effect. `action` is already rendered against the
    /// payload. Returns handler output or [`serde_json::Value::Null`].
    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError>;
}

/// Action type → handler map, injected into the executor.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired to the standard collaborator-backed handlers.
    #[must_use]
    pub fn standard<N, E, T, D, S, G>(
        notifications: N,
        email: E,
        tasks: T,
        documents: D,
        status: S,
        text: G,
    ) -> Self
    where
        N: NotificationService + Send + Sync + 'static,
        E: EmailService + Send + Sync + 'static,
        T: TaskService + Send + Sync + 'static,
        D: DocumentService + Send + Sync + 'static,
        S: StatusService + Send + Sync + 'static,
        G: TextGenerationService + Send + Sync + 'static,
    {
        Self::new()
            .with_handler(NotificationHandler(notifications))
            .with_handler(EmailHandler(email))
            .with_handler(TaskHandler(tasks))
            .with_handler(DocumentHandler(documents))
            .with_handler(StatusHandler(status))
            .with_handler(TextGenerationHandler(text))
    }

    /// Add or replace the handler for its action type.
    #[must_use]
    pub fn with_handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    #[must_use]
    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type).cloned()
    }

    /// Registered action types, sorted.
    #[must_use]
    pub fn action_types(&self) -> Vec<ActionType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("action_types", &self.action_types())
            .finish()
    }
}

fn mismatch(expected: ActionType, action: &ActionSpec) -> ActionError {
    ActionError::permanent(format!(
        "{expected} handler cannot execute {}",
        action.action_type()
    ))
}

struct NotificationHandler<N>(N);

#[async_trait]
impl<N: NotificationService + Send + Sync> ActionHandler for NotificationHandler<N> {
    fn action_type(&self) -> ActionType {
        ActionType::SendNotification
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::SendNotification { recipient, message } = action else {
            return Err(mismatch(self.action_type(), action));
        };
        self.0
            .send(recipient, message, &ctx.idempotency_key())
            .await?;
        Ok(serde_json::Value::Null)
    }
}

struct EmailHandler<E>(E);

#[async_trait]
impl<E: EmailService + Send + Sync> ActionHandler for EmailHandler<E> {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::SendEmail { to, subject, body } = action else {
            return Err(mismatch(self.action_type(), action));
        };
        self.0
            .send(to, subject, body, &ctx.idempotency_key())
            .await?;
        Ok(serde_json::Value::Null)
    }
}

struct TaskHandler<T>(T);

#[async_trait]
impl<T: TaskService + Send + Sync> ActionHandler for TaskHandler<T> {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::CreateTask {
            title,
            description,
            assignee,
            due_in_days,
        } = action
        else {
            return Err(mismatch(self.action_type(), action));
        };
        let task = NewTask {
            title: title.clone(),
            description: description.clone(),
            assignee: assignee.clone(),
            due_in_days: *due_in_days,
        };
        let task_id = self.0.create(task, &ctx.idempotency_key()).await?;
        Ok(serde_json::json!({ "task_id": task_id }))
    }
}

struct DocumentHandler<D>(D);

#[async_trait]
impl<D: DocumentService + Send + Sync> ActionHandler for DocumentHandler<D> {
    fn action_type(&self) -> ActionType {
        ActionType::CreateDocument
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::CreateDocument { title, content } = action else {
            return Err(mismatch(self.action_type(), action));
        };
        let document_id = self
            .0
            .create(title, content, &ctx.idempotency_key())
            .await?;
        Ok(serde_json::json!({ "document_id": document_id }))
    }
}

struct StatusHandler<S>(S);

#[async_trait]
impl<S: StatusService + Send + Sync> ActionHandler for StatusHandler<S> {
    fn action_type(&self) -> ActionType {
        ActionType::UpdateStatus
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::UpdateStatus {
            entity,
            entity_id,
            field,
            value,
        } = action
        else {
            return Err(mismatch(self.action_type(), action));
        };
        self.0
            .update(entity, entity_id, field, value, &ctx.idempotency_key())
            .await?;
        Ok(serde_json::Value::Null)
    }
}

struct TextGenerationHandler<G>(G);

#[async_trait]
impl<G: TextGenerationService + Send + Sync> ActionHandler for TextGenerationHandler<G> {
    fn action_type(&self) -> ActionType {
        ActionType::InvokeAi
    }

    /// Generation is not idempotent.
    fn retryable(&self) -> bool {
        false
    }

    async fn handle(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        let ActionSpec::InvokeAi { prompt, .. } = action else {
            return Err(mismatch(self.action_type(), action));
        };
        let text = self.0.generate(prompt, ctx.timeout).await?;
        Ok(serde_json::json!({ "text": text }))
    }
}
