//! Trigger matcher — selects the active rules an event should run.

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::Event;
use autoflow_domain::rule::{AutomationRule, evaluate_all};

use crate::ports::RuleRepository;

/// Finds the rules matching an event.
pub struct TriggerMatcher<R> {
    rules: R,
}

impl<R: RuleRepository> TriggerMatcher<R> {
    pub fn new(rules: R) -> Self {
        Self { rules }
    }

    /// Active rules whose trigger type equals the event type and whose
    /// conditions hold against the payload.
    ///
    /// Order is `(created_at, id)`, so replays of the same event see the
    /// same sequence. Events carrying an owner only match that owner's
    /// rules. A malformed condition excludes its rule and logs a warning.
    ///
    /// # Errors
    ///
    /// Returns a storage error if loading rules fails.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, dedup_key = %event.dedup_key))]
    pub async fn match_event(&self, event: &Event) -> Result<Vec<AutomationRule>, AutoflowError> {
        let mut candidates = self
            .rules
            .list_active_by_trigger_type(event.event_type)
            .await?;
        candidates.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let matched: Vec<_> = candidates
            .into_iter()
            .filter(|rule| rule.is_active() && rule.trigger_type == event.event_type)
            .filter(|rule| admits(rule, event))
            .collect();
        tracing::debug!(matched = matched.len(), "rules matched");
        Ok(matched)
    }
}

/// Owner scope and conditions of `rule` hold for `event`.
///
/// Fails closed: a malformed condition rejects the rule with a warning.
pub fn admits(rule: &AutomationRule, event: &Event) -> bool {
    if event.owner_id.is_some_and(|owner| owner != rule.owner_id) {
        return false;
    }
    match evaluate_all(&rule.conditions, &event.payload) {
        Ok(matches) => matches,
        Err(err) => {
            tracing::warn!(rule_id = %rule.id, error = %err, "malformed condition, rule skipped");
            false
        }
    }
}
