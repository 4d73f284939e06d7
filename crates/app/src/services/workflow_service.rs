//! Workflow service — use-cases for authoring workflow templates.
//!
//! Saving a template checks its sub-workflow references against every
//! stored template first, so a cycle is rejected before anything is
//! persisted and never has to be caught at execution time.

use std::collections::HashMap;

use autoflow_domain::error::{AutoflowError, IntegrityViolation, NotFoundError};
use autoflow_domain::event::{Notice, NoticeKind};
use autoflow_domain::id::TemplateId;
use autoflow_domain::time::now;
use autoflow_domain::workflow::{WorkflowTemplate, check_references};

use crate::ports::{NoticePublisher, RuleRepository, WorkflowTemplateRepository};

/// Application service for workflow template CRUD.
pub struct WorkflowService<W, R, P> {
    templates: W,
    rules: R,
    publisher: P,
}

impl<W, R, P> WorkflowService<W, R, P>
where
    W: WorkflowTemplateRepository + Sync,
    R: RuleRepository + Sync,
    P: NoticePublisher + Sync,
{
    /// Create a new service backed by the given repositories.
    pub fn new(templates: W, rules: R, publisher: P) -> Self {
        Self {
            templates,
            rules,
            publisher,
        }
    }

    /// Validate and persist a new template.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::Validation`] or
    /// [`AutoflowError::Configuration`] (including reference cycles and
    /// unknown sub-workflows) without persisting anything,
    /// [`AutoflowError::Integrity`] if a template with the same id is
    /// already stored, or a storage error from the repository.
    #[tracing::instrument(skip(self, template), fields(template_name = %template.name))]
    pub async fn create_template(
        &self,
        template: WorkflowTemplate,
    ) -> Result<WorkflowTemplate, AutoflowError> {
        if self.templates.get(template.id).await?.is_some() {
            return Err(IntegrityViolation::AlreadyExists {
                entity: "workflow template",
                id: template.id.to_string(),
            }
            .into());
        }
        self.check(&template).await?;
        let template = self.templates.save(template).await?;
        tracing::info!(template_id = %template.id, kind = %template.kind, "workflow template created");
        self.notify(NoticeKind::WorkflowCreated, &template).await;
        Ok(template)
    }

    /// Look up a template by id.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] when no template with `id`
    /// exists, or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_template(&self, id: TemplateId) -> Result<WorkflowTemplate, AutoflowError> {
        self.templates
            .get(id)
            .await?
            .ok_or_else(|| not_found(id).into())
    }

    /// List all templates.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AutoflowError> {
        self.templates.list().await
    }

    /// Replace an existing template, keeping its owner and creation time.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown templates and the
    /// same errors as [`create_template`](Self::create_template).
    #[tracing::instrument(skip(self, template), fields(template_id = %template.id))]
    pub async fn update_template(
        &self,
        mut template: WorkflowTemplate,
    ) -> Result<WorkflowTemplate, AutoflowError> {
        let existing = self.get_template(template.id).await?;
        template.owner_id = existing.owner_id;
        template.created_at = existing.created_at;
        template.updated_at = now();
        self.check(&template).await?;
        let template = self.templates.save(template).await?;
        self.notify(NoticeKind::WorkflowUpdated, &template).await;
        Ok(template)
    }

    /// Delete a template nothing refers to any more.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown templates and
    /// [`AutoflowError::Integrity`] while a non-deleted rule or another
    /// template still runs it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_template(&self, id: TemplateId) -> Result<(), AutoflowError> {
        let template = self.get_template(id).await?;

        if let Some(rule) = self
            .rules
            .list()
            .await?
            .into_iter()
            .find(|rule| rule.referenced_templates().any(|t| t == id))
        {
            return Err(IntegrityViolation::TemplateReferenced {
                template_id: id.to_string(),
                referrer: format!("rule {}", rule.id),
            }
            .into());
        }
        if let Some(other) = self
            .templates
            .list()
            .await?
            .into_iter()
            .find(|other| other.id != id && other.referenced_templates().any(|t| t == id))
        {
            return Err(IntegrityViolation::TemplateReferenced {
                template_id: id.to_string(),
                referrer: format!("workflow template {}", other.id),
            }
            .into());
        }

        self.templates.delete(id).await?;
        self.notify(NoticeKind::WorkflowDeleted, &template).await;
        Ok(())
    }

    async fn check(&self, template: &WorkflowTemplate) -> Result<(), AutoflowError> {
        template.validate()?;
        if template.referenced_templates().next().is_none() {
            return Ok(());
        }
        let known: HashMap<_, _> = self
            .templates
            .list()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        check_references(template, &known)?;
        Ok(())
    }

    async fn notify(&self, kind: NoticeKind, template: &WorkflowTemplate) {
        let data = serde_json::json!({
            "template_id": template.id,
            "name": template.name,
            "type": template.kind,
        });
        let _ = self.publisher.publish(Notice::new(kind, data)).await;
    }
}

fn not_found(id: TemplateId) -> NotFoundError {
    NotFoundError {
        entity: "WorkflowTemplate",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::error::{ConfigurationError, ValidationError};
    use autoflow_domain::rule::{ActionSpec, AutomationRule, RuleStatus, TriggerType};
    use autoflow_domain::workflow::{WorkflowKind, WorkflowStep};
    use std::sync::Arc;

    use crate::test_support::{InMemoryRuleRepo, InMemoryTemplateRepo, SpyPublisher};

    struct Fixture {
        service: WorkflowService<Arc<InMemoryTemplateRepo>, Arc<InMemoryRuleRepo>, Arc<SpyPublisher>>,
        templates: Arc<InMemoryTemplateRepo>,
        publisher: Arc<SpyPublisher>,
    }

    fn fixture(rules: Vec<AutomationRule>) -> Fixture {
        let templates = InMemoryTemplateRepo::with(vec![]);
        let publisher = Arc::new(SpyPublisher::default());
        let service = WorkflowService::new(
            Arc::clone(&templates),
            InMemoryRuleRepo::with(rules),
            Arc::clone(&publisher),
        );
        Fixture {
            service,
            templates,
            publisher,
        }
    }

    fn ping() -> WorkflowStep {
        WorkflowStep::action(
            "ping",
            ActionSpec::SendNotification {
                recipient: "ops".into(),
                message: "ping".into(),
            },
        )
    }

    fn calls(template_id: TemplateId) -> WorkflowStep {
        WorkflowStep::action("sub", ActionSpec::RunWorkflow { template_id })
    }

    fn template(name: &str, steps: Vec<WorkflowStep>) -> WorkflowTemplate {
        let mut builder = WorkflowTemplate::builder().name(name);
        for step in steps {
            builder = builder.step(step);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn should_create_template_and_publish_notice() {
        let f = fixture(vec![]);
        let created = f.service.create_template(template("a", vec![ping()])).await.unwrap();

        assert_eq!(f.service.get_template(created.id).await.unwrap().name, "a");
        let notices = f.publisher.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::WorkflowCreated);
        assert_eq!(notices[0].data["type"], "SEQUENTIAL");
    }

    #[tokio::test]
    async fn should_reject_create_when_template_id_already_exists() {
        let f = fixture(vec![]);
        let created = f.service.create_template(template("a", vec![ping()])).await.unwrap();

        let mut replacement = template("b", vec![ping()]);
        replacement.id = created.id;
        let result = f.service.create_template(replacement).await;

        assert!(matches!(
            result,
            Err(AutoflowError::Integrity(IntegrityViolation::AlreadyExists { .. }))
        ));
        let stored = f.templates.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "a");
        assert_eq!(f.publisher.notices().len(), 1);
    }

    #[tokio::test]
    async fn should_reject_update_introducing_cycle_and_persist_nothing() {
        let f = fixture(vec![]);
        let b = f.service.create_template(template("b", vec![ping()])).await.unwrap();
        let a = f
            .service
            .create_template(template("a", vec![calls(b.id)]))
            .await
            .unwrap();

        let mut cyclic_b = b.clone();
        cyclic_b.steps.push(calls(a.id));
        let result = f.service.update_template(cyclic_b).await;

        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(ConfigurationError::CyclicTemplate(_)))
        ));
        let stored = f.service.get_template(b.id).await.unwrap();
        assert_eq!(stored.steps.len(), 1);
        assert_eq!(f.publisher.notices().len(), 2);
    }

    #[tokio::test]
    async fn should_reject_self_referencing_template() {
        let f = fixture(vec![]);
        let id = TemplateId::new();
        let looped = WorkflowTemplate::builder()
            .id(id)
            .name("loop")
            .step(calls(id))
            .build()
            .unwrap();

        let result = f.service.create_template(looped).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(ConfigurationError::CyclicTemplate(_)))
        ));
        assert_eq!(f.templates.len(), 0);
    }

    #[tokio::test]
    async fn should_reject_reference_to_unknown_template() {
        let f = fixture(vec![]);
        let result = f
            .service
            .create_template(template("a", vec![calls(TemplateId::new())]))
            .await;
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(ConfigurationError::UnknownTemplate(_)))
        ));
    }

    #[tokio::test]
    async fn should_reject_conditional_template_without_leading_condition() {
        let f = fixture(vec![]);
        let mut conditional = template("c", vec![ping()]);
        conditional.kind = WorkflowKind::Conditional;
        let result = f.service.create_template(conditional).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(
                ConfigurationError::MissingLeadingCondition
            ))
        ));
    }

    #[tokio::test]
    async fn should_reject_template_without_steps() {
        let f = fixture(vec![]);
        let mut empty = template("empty", vec![ping()]);
        empty.steps.clear();
        let result = f.service.create_template(empty).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Validation(ValidationError::NoSteps))
        ));
    }

    #[tokio::test]
    async fn should_block_delete_while_referenced_by_rule() {
        let shared = template("shared", vec![ping()]);
        let rule = AutomationRule::builder()
            .name("uses shared")
            .trigger_type(TriggerType::TaskCompleted)
            .status(RuleStatus::Active)
            .action(ActionSpec::RunWorkflow {
                template_id: shared.id,
            })
            .build()
            .unwrap();
        let f = fixture(vec![rule]);
        f.service.create_template(shared.clone()).await.unwrap();

        let result = f.service.delete_template(shared.id).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Integrity(IntegrityViolation::TemplateReferenced { .. }))
        ));
        assert!(f.service.get_template(shared.id).await.is_ok());
    }

    #[tokio::test]
    async fn should_block_delete_while_referenced_by_other_template() {
        let f = fixture(vec![]);
        let child = f.service.create_template(template("child", vec![ping()])).await.unwrap();
        f.service
            .create_template(template("parent", vec![calls(child.id)]))
            .await
            .unwrap();

        let result = f.service.delete_template(child.id).await;
        assert!(matches!(result, Err(AutoflowError::Integrity(_))));
    }

    #[tokio::test]
    async fn should_delete_unreferenced_template() {
        let f = fixture(vec![]);
        let created = f.service.create_template(template("a", vec![ping()])).await.unwrap();

        f.service.delete_template(created.id).await.unwrap();

        assert!(matches!(
            f.service.get_template(created.id).await,
            Err(AutoflowError::NotFound(_))
        ));
        assert_eq!(
            f.publisher.notices().last().unwrap().kind,
            NoticeKind::WorkflowDeleted
        );
    }
}
