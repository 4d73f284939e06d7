//! Rule service — use-cases for authoring automation rules.

use autoflow_domain::error::{
    AutoflowError, ConfigurationError, IntegrityViolation, NotFoundError, ValidationError,
};
use autoflow_domain::event::{Notice, NoticeKind};
use autoflow_domain::id::RuleId;
use autoflow_domain::rule::{AutomationRule, RuleStatus};
use autoflow_domain::time::now;

use crate::ports::{NoticePublisher, RuleRepository, WorkflowTemplateRepository};

/// Application service for rule CRUD and lifecycle operations.
pub struct RuleService<R, W, P> {
    rules: R,
    templates: W,
    publisher: P,
}

impl<R, W, P> RuleService<R, W, P>
where
    R: RuleRepository + Sync,
    W: WorkflowTemplateRepository + Sync,
    P: NoticePublisher + Sync,
{
    /// Create a new service backed by the given repositories.
    pub fn new(rules: R, templates: W, publisher: P) -> Self {
        Self {
            rules,
            templates,
            publisher,
        }
    }

    /// Validate and persist a new rule. Drafts are activated on save.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::Validation`] or
    /// [`AutoflowError::Configuration`] if the rule is invalid, starts out
    /// inactive or deleted, or runs a template that does not exist.
    /// Returns [`AutoflowError::Integrity`] if a rule with the same id is
    /// already stored, or a storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule, AutoflowError> {
        rule.validate()?;
        if !matches!(rule.status, RuleStatus::Draft | RuleStatus::Active) {
            return Err(ValidationError::InvalidTransition {
                from: rule.status.to_string(),
                to: RuleStatus::Active.to_string(),
            }
            .into());
        }
        if self.rules.get(rule.id).await?.is_some() {
            return Err(IntegrityViolation::AlreadyExists {
                entity: "rule",
                id: rule.id.to_string(),
            }
            .into());
        }
        self.ensure_templates_exist(&rule).await?;
        if rule.status == RuleStatus::Draft {
            rule.activate()?;
        }
        let rule = self.rules.save(rule).await?;
        tracing::info!(rule_id = %rule.id, "rule created");
        self.notify(NoticeKind::RuleCreated, &rule).await;
        Ok(rule)
    }

    /// Look up a rule by id. Deleted rules stay resolvable.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] when no rule with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<AutomationRule, AutoflowError> {
        self.rules.get(id).await?.ok_or_else(|| not_found(id).into())
    }

    /// List all non-deleted rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_rules(&self) -> Result<Vec<AutomationRule>, AutoflowError> {
        self.rules.list().await
    }

    /// Replace the definition of an existing rule.
    ///
    /// Identity, owner, status and creation time are kept from the stored
    /// rule; status only changes through the lifecycle operations.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown or deleted rules and
    /// the same validation errors as [`create_rule`](Self::create_rule).
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule, AutoflowError> {
        let existing = self.get_live(rule.id).await?;
        rule.owner_id = existing.owner_id;
        rule.status = existing.status;
        rule.created_at = existing.created_at;
        rule.updated_at = now();
        rule.validate()?;
        self.ensure_templates_exist(&rule).await?;
        let rule = self.rules.save(rule).await?;
        self.notify(NoticeKind::RuleUpdated, &rule).await;
        Ok(rule)
    }

    /// Activate or deactivate a rule. In-flight runs are not affected.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown or deleted rules.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, id: RuleId, active: bool) -> Result<AutomationRule, AutoflowError> {
        let mut rule = self.get_live(id).await?;
        if active {
            rule.activate()?;
        } else {
            rule.deactivate()?;
        }
        let rule = self.rules.save(rule).await?;
        self.notify(NoticeKind::RuleUpdated, &rule).await;
        Ok(rule)
    }

    /// Flip a rule between active and inactive.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown or deleted rules.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_rule(&self, id: RuleId) -> Result<AutomationRule, AutoflowError> {
        let mut rule = self.get_live(id).await?;
        rule.toggle()?;
        let rule = self.rules.save(rule).await?;
        self.notify(NoticeKind::RuleUpdated, &rule).await;
        Ok(rule)
    }

    /// Soft-delete a rule: it is never matched again but stays resolvable
    /// from its runs.
    ///
    /// # Errors
    ///
    /// Returns [`AutoflowError::NotFound`] for unknown or already deleted
    /// rules.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), AutoflowError> {
        let mut rule = self.get_live(id).await?;
        rule.mark_deleted()?;
        let rule = self.rules.save(rule).await?;
        self.notify(NoticeKind::RuleDeleted, &rule).await;
        Ok(())
    }

    async fn get_live(&self, id: RuleId) -> Result<AutomationRule, AutoflowError> {
        self.rules
            .get(id)
            .await?
            .filter(|rule| rule.status != RuleStatus::Deleted)
            .ok_or_else(|| not_found(id).into())
    }

    async fn ensure_templates_exist(&self, rule: &AutomationRule) -> Result<(), AutoflowError> {
        for template_id in rule.referenced_templates() {
            if self.templates.get(template_id).await?.is_none() {
                return Err(ConfigurationError::UnknownTemplate(template_id.to_string()).into());
            }
        }
        Ok(())
    }

    async fn notify(&self, kind: NoticeKind, rule: &AutomationRule) {
        let data = serde_json::json!({
            "rule_id": rule.id,
            "name": rule.name,
            "status": rule.status,
        });
        let _ = self.publisher.publish(Notice::new(kind, data)).await;
    }
}

fn not_found(id: RuleId) -> NotFoundError {
    NotFoundError {
        entity: "AutomationRule",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::id::TemplateId;
    use autoflow_domain::rule::{ActionSpec, TriggerType};
    use autoflow_domain::workflow::{WorkflowStep, WorkflowTemplate};
    use std::sync::Arc;

    use crate::test_support::{InMemoryRuleRepo, InMemoryTemplateRepo, SpyPublisher};

    type Service = RuleService<Arc<InMemoryRuleRepo>, Arc<InMemoryTemplateRepo>, Arc<SpyPublisher>>;

    fn service_with(templates: Vec<WorkflowTemplate>) -> (Service, Arc<SpyPublisher>) {
        let publisher = Arc::new(SpyPublisher::default());
        let service = RuleService::new(
            InMemoryRuleRepo::with(vec![]),
            InMemoryTemplateRepo::with(templates),
            Arc::clone(&publisher),
        );
        (service, publisher)
    }

    fn draft() -> AutomationRule {
        AutomationRule::builder()
            .name("welcome")
            .trigger_type(TriggerType::ClientCreated)
            .action(ActionSpec::SendEmail {
                to: "{{client.email}}".into(),
                subject: "Welcome".into(),
                body: String::new(),
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_activate_draft_when_created() {
        let (service, publisher) = service_with(vec![]);
        let created = service.create_rule(draft()).await.unwrap();

        assert_eq!(created.status, RuleStatus::Active);
        assert_eq!(service.get_rule(created.id).await.unwrap().status, RuleStatus::Active);
        assert_eq!(publisher.notices()[0].kind, NoticeKind::RuleCreated);
    }

    #[tokio::test]
    async fn should_reject_create_when_rule_id_already_exists() {
        let (service, publisher) = service_with(vec![]);
        let created = service.create_rule(draft()).await.unwrap();

        let mut replacement = draft();
        replacement.id = created.id;
        replacement.name = "hijack".into();
        let result = service.create_rule(replacement).await;

        assert!(matches!(
            result,
            Err(AutoflowError::Integrity(IntegrityViolation::AlreadyExists { entity: "rule", .. }))
        ));
        assert_eq!(service.get_rule(created.id).await.unwrap().name, "welcome");
        assert_eq!(publisher.notices().len(), 1);
    }

    #[tokio::test]
    async fn should_reject_create_when_rule_starts_inactive_or_deleted() {
        let (service, _) = service_with(vec![]);
        for status in [RuleStatus::Inactive, RuleStatus::Deleted] {
            let mut rule = draft();
            rule.status = status;
            let result = service.create_rule(rule).await;
            assert!(matches!(
                result,
                Err(AutoflowError::Validation(ValidationError::InvalidTransition { .. }))
            ));
        }
        assert!(service.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_rule_running_unknown_template() {
        let (service, publisher) = service_with(vec![]);
        let mut rule = draft();
        rule.actions.push(ActionSpec::RunWorkflow {
            template_id: TemplateId::new(),
        });

        let result = service.create_rule(rule).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Configuration(ConfigurationError::UnknownTemplate(_)))
        ));
        assert!(service.list_rules().await.unwrap().is_empty());
        assert!(publisher.notices().is_empty());
    }

    #[tokio::test]
    async fn should_accept_rule_running_existing_template() {
        let template = WorkflowTemplate::builder()
            .name("onboarding")
            .step(WorkflowStep::action(
                "ping",
                ActionSpec::SendNotification {
                    recipient: "r".into(),
                    message: "m".into(),
                },
            ))
            .build()
            .unwrap();
        let (service, _) = service_with(vec![template.clone()]);
        let mut rule = draft();
        rule.actions.push(ActionSpec::RunWorkflow {
            template_id: template.id,
        });
        assert!(service.create_rule(rule).await.is_ok());
    }

    #[tokio::test]
    async fn should_return_validation_error_when_name_is_empty() {
        let (service, _) = service_with(vec![]);
        let mut rule = draft();
        rule.name = "   ".into();
        let result = service.create_rule(rule).await;
        assert!(matches!(
            result,
            Err(AutoflowError::Validation(ValidationError::EmptyName))
        ));
    }

    #[tokio::test]
    async fn should_toggle_between_active_and_inactive() {
        let (service, _) = service_with(vec![]);
        let rule = service.create_rule(draft()).await.unwrap();

        let toggled = service.toggle_rule(rule.id).await.unwrap();
        assert_eq!(toggled.status, RuleStatus::Inactive);
        let toggled = service.toggle_rule(rule.id).await.unwrap();
        assert_eq!(toggled.status, RuleStatus::Active);
        let deactivated = service.set_active(rule.id, false).await.unwrap();
        assert!(!deactivated.is_active());
    }

    #[tokio::test]
    async fn should_keep_deleted_rule_resolvable_but_unlisted() {
        let (service, publisher) = service_with(vec![]);
        let rule = service.create_rule(draft()).await.unwrap();

        service.delete_rule(rule.id).await.unwrap();

        assert!(service.list_rules().await.unwrap().is_empty());
        assert_eq!(service.get_rule(rule.id).await.unwrap().status, RuleStatus::Deleted);
        assert!(matches!(
            service.toggle_rule(rule.id).await,
            Err(AutoflowError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_rule(rule.id).await,
            Err(AutoflowError::NotFound(_))
        ));
        assert_eq!(publisher.notices().last().unwrap().kind, NoticeKind::RuleDeleted);
    }

    #[tokio::test]
    async fn should_keep_identity_and_status_when_updating() {
        let (service, _) = service_with(vec![]);
        let rule = service.create_rule(draft()).await.unwrap();
        service.set_active(rule.id, false).await.unwrap();

        let mut changed = rule.clone();
        changed.name = "renamed".into();
        changed.status = RuleStatus::Active;
        let updated = service.update_rule(changed).await.unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.status, RuleStatus::Inactive);
        assert_eq!(updated.created_at, rule.created_at);
    }

    #[tokio::test]
    async fn should_return_not_found_when_updating_unknown_rule() {
        let (service, _) = service_with(vec![]);
        let result = service.update_rule(draft()).await;
        assert!(matches!(result, Err(AutoflowError::NotFound(_))));
    }
}
