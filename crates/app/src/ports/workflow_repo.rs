//! Workflow template repository port.

use std::future::Future;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::id::TemplateId;
use autoflow_domain::workflow::WorkflowTemplate;

/// Repository for persisting and querying [`WorkflowTemplate`]s.
pub trait WorkflowTemplateRepository {
    /// Insert or replace a template.
    fn save(
        &self,
        template: WorkflowTemplate,
    ) -> impl Future<Output = Result<WorkflowTemplate, AutoflowError>> + Send;

    fn get(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<WorkflowTemplate>, AutoflowError>> + Send;

    /// All templates, oldest first.
    fn list(&self) -> impl Future<Output = Result<Vec<WorkflowTemplate>, AutoflowError>> + Send;

    /// Remove a template. Referential checks are the caller's job.
    fn delete(&self, id: TemplateId) -> impl Future<Output = Result<(), AutoflowError>> + Send;
}

impl<T: WorkflowTemplateRepository + Send + Sync> WorkflowTemplateRepository
    for std::sync::Arc<T>
{
    fn save(
        &self,
        template: WorkflowTemplate,
    ) -> impl Future<Output = Result<WorkflowTemplate, AutoflowError>> + Send {
        (**self).save(template)
    }

    fn get(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<WorkflowTemplate>, AutoflowError>> + Send {
        (**self).get(id)
    }

    fn list(&self) -> impl Future<Output = Result<Vec<WorkflowTemplate>, AutoflowError>> + Send {
        (**self).list()
    }

    fn delete(&self, id: TemplateId) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        (**self).delete(id)
    }
}
