//! External collaborator ports — one interface per action type.
//!
//! Every side-effecting call accepts an idempotency key (`runId:stepPath`).
//! Implementations must treat a repeated key as a no-op that returns the
//! original result, so the executor can retry transient failures without
//! double-sending.

use std::future::Future;
use std::time::Duration;

use autoflow_domain::error::ActionError;

pub trait NotificationService {
    fn send(
        &self,
        recipient: &str,
        message: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send;
}

pub trait EmailService {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// Parameters of a task to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub due_in_days: Option<u32>,
}

pub trait TaskService {
    /// Create a task and return its external id.
    fn create(
        &self,
        task: NewTask,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<String, ActionError>> + Send;
}

pub trait DocumentService {
    /// Create a document and return its external id.
    fn create(
        &self,
        title: &str,
        content: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<String, ActionError>> + Send;
}

/// Mutates domain entities. Last write wins on the same field, but a
/// replayed key does not write again.
pub trait StatusService {
    fn update(
        &self,
        entity: &str,
        entity_id: &str,
        field: &str,
        value: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// The AI drafting collaborator. Output is an opaque string.
pub trait TextGenerationService {
    fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ActionError>> + Send;
}
