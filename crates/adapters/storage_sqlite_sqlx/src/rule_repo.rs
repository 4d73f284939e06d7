//! `SQLite` implementation of [`RuleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use autoflow_app::ports::RuleRepository;
use autoflow_domain::error::AutoflowError;
use autoflow_domain::id::{OwnerId, RuleId};
use autoflow_domain::rule::{AutomationRule, RuleStatus, TriggerType};
use autoflow_domain::schedule::Schedule;

use crate::codec::{decode_err, decode_json, decode_parsed, decode_ts, encode_ts};
use crate::error::StorageError;

struct Wrapper(AutomationRule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<AutomationRule> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let owner_id: uuid::Uuid = row.try_get("owner_id")?;
        let trigger_type: String = row.try_get("trigger_type")?;
        let schedule: Option<String> = row.try_get("schedule")?;
        let conditions: String = row.try_get("conditions")?;
        let actions: String = row.try_get("actions")?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self(AutomationRule {
            id: RuleId::from_uuid(id),
            owner_id: OwnerId::from_uuid(owner_id),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            trigger_type: decode_parsed::<TriggerType>(&trigger_type)?,
            schedule: schedule
                .map(|expr| Schedule::parse(expr).map_err(decode_err))
                .transpose()?,
            conditions: decode_json(&conditions)?,
            actions: decode_json(&actions)?,
            continue_on_error: row.try_get("continue_on_error")?,
            status: decode_parsed::<RuleStatus>(&status)?,
            created_at: decode_ts(&created_at)?,
            updated_at: decode_ts(&updated_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO rules (
        id, owner_id, name, description, trigger_type, schedule, conditions,
        actions, continue_on_error, status, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        owner_id = excluded.owner_id,
        name = excluded.name,
        description = excluded.description,
        trigger_type = excluded.trigger_type,
        schedule = excluded.schedule,
        conditions = excluded.conditions,
        actions = excluded.actions,
        continue_on_error = excluded.continue_on_error,
        status = excluded.status,
        updated_at = excluded.updated_at
";

const SELECT_BY_ID: &str = "SELECT * FROM rules WHERE id = ?";
const SELECT_LIVE: &str =
    "SELECT * FROM rules WHERE status != 'deleted' ORDER BY created_at, id";
const SELECT_ACTIVE_BY_TRIGGER: &str =
    "SELECT * FROM rules WHERE status = 'active' AND trigger_type = ? ORDER BY created_at, id";

/// `SQLite`-backed rule repository.
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RuleRepository for SqliteRuleRepository {
    async fn save(&self, rule: AutomationRule) -> Result<AutomationRule, AutoflowError> {
        let conditions = serde_json::to_string(&rule.conditions).map_err(StorageError::from)?;
        let actions = serde_json::to_string(&rule.actions).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(rule.id.as_uuid())
            .bind(rule.owner_id.as_uuid())
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.trigger_type.as_str())
            .bind(rule.schedule.as_ref().map(Schedule::expression))
            .bind(&conditions)
            .bind(&actions)
            .bind(rule.continue_on_error)
            .bind(rule.status.as_str())
            .bind(encode_ts(rule.created_at))
            .bind(encode_ts(rule.updated_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get(&self, id: RuleId) -> Result<Option<AutomationRule>, AutoflowError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn list(&self) -> Result<Vec<AutomationRule>, AutoflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_LIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn list_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<AutomationRule>, AutoflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ACTIVE_BY_TRIGGER)
            .bind(trigger_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use autoflow_domain::rule::{ActionSpec, Condition};

    async fn setup() -> SqliteRuleRepository {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        SqliteRuleRepository::new(db.pool().clone())
    }

    fn rule(name: &str, trigger_type: TriggerType, status: RuleStatus) -> AutomationRule {
        AutomationRule::builder()
            .name(name)
            .trigger_type(trigger_type)
            .status(status)
            .condition(Condition::And {
                all: vec![
                    Condition::equals("clientId", "c1"),
                    Condition::Exists {
                        field: "proposal.id".into(),
                    },
                ],
            })
            .action(ActionSpec::SendNotification {
                recipient: "owner".into(),
                message: "New proposal from {{clientId}}".into(),
            })
            .action(ActionSpec::CreateTask {
                title: "Follow up".into(),
                description: Some("Call the client".into()),
                assignee: None,
                due_in_days: Some(3),
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_save_and_retrieve_rule_with_conditions_and_actions() {
        let repo = setup().await;
        let original = rule("proposal", TriggerType::NewProposal, RuleStatus::Active);

        repo.save(original.clone()).await.unwrap();
        let fetched = repo.get(original.id).await.unwrap().unwrap();

        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.owner_id, original.owner_id);
        assert_eq!(fetched.trigger_type, TriggerType::NewProposal);
        assert_eq!(fetched.conditions, original.conditions);
        assert_eq!(fetched.actions, original.actions);
        assert_eq!(fetched.created_at, original.created_at);
    }

    #[tokio::test]
    async fn should_return_none_when_rule_not_found() {
        let repo = setup().await;
        assert!(repo.get(RuleId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_overwrite_rule_on_second_save() {
        let repo = setup().await;
        let mut original = rule("proposal", TriggerType::NewProposal, RuleStatus::Active);
        repo.save(original.clone()).await.unwrap();

        original.name = "renamed".into();
        original.deactivate().unwrap();
        repo.save(original.clone()).await.unwrap();

        let fetched = repo.get(original.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "renamed");
        assert_eq!(fetched.status, RuleStatus::Inactive);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_list_only_active_rules_of_trigger_type_in_creation_order() {
        let repo = setup().await;
        let first = rule("first", TriggerType::NewProposal, RuleStatus::Active);
        let mut second = rule("second", TriggerType::NewProposal, RuleStatus::Active);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let inactive = rule("inactive", TriggerType::NewProposal, RuleStatus::Inactive);
        let other = rule("other", TriggerType::ClientCreated, RuleStatus::Active);
        for r in [second.clone(), inactive, other, first.clone()] {
            repo.save(r).await.unwrap();
        }

        let active = repo
            .list_active_by_trigger_type(TriggerType::NewProposal)
            .await
            .unwrap();
        assert_eq!(
            active.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }

    #[tokio::test]
    async fn should_hide_deleted_rules_from_list_but_keep_them_resolvable() {
        let repo = setup().await;
        let mut deleted = rule("gone", TriggerType::TaskCompleted, RuleStatus::Active);
        deleted.mark_deleted().unwrap();
        repo.save(deleted.clone()).await.unwrap();

        assert!(repo.list().await.unwrap().is_empty());
        assert_eq!(
            repo.get(deleted.id).await.unwrap().unwrap().status,
            RuleStatus::Deleted
        );
    }

    #[tokio::test]
    async fn should_preserve_schedule_expression() {
        let repo = setup().await;
        let scheduled = AutomationRule::builder()
            .name("digest")
            .trigger_type(TriggerType::Scheduled)
            .schedule(Schedule::parse("0 8 * * 1-5").unwrap())
            .action(ActionSpec::SendNotification {
                recipient: "team".into(),
                message: "daily digest".into(),
            })
            .build()
            .unwrap();
        repo.save(scheduled.clone()).await.unwrap();

        let fetched = repo.get(scheduled.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.schedule.as_ref().map(Schedule::expression),
            Some("0 8 * * 1-5")
        );
    }
}
