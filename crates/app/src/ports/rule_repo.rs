//! Rule repository port — the sole source of rule truth.

use std::future::Future;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::id::RuleId;
use autoflow_domain::rule::{AutomationRule, TriggerType};

/// Repository for persisting and querying [`AutomationRule`]s.
///
/// Rules are never hard-deleted; deletion is a status change persisted
/// through [`save`](Self::save).
pub trait RuleRepository {
    /// Insert or replace a rule.
    fn save(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, AutoflowError>> + Send;

    /// Get a rule by id, whatever its status.
    fn get(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, AutoflowError>> + Send;

    /// All non-deleted rules, oldest first.
    fn list(&self) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send;

    /// Active rules for a trigger type, ordered by `(created_at, id)`.
    fn list_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send;
}

impl<T: RuleRepository + Send + Sync> RuleRepository for std::sync::Arc<T> {
    fn save(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, AutoflowError>> + Send {
        (**self).save(rule)
    }

    fn get(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, AutoflowError>> + Send {
        (**self).get(id)
    }

    fn list(&self) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send {
        (**self).list()
    }

    fn list_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, AutoflowError>> + Send {
        (**self).list_active_by_trigger_type(trigger_type)
    }
}
