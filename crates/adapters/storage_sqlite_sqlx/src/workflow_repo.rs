//! `SQLite` implementation of [`WorkflowTemplateRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use autoflow_app::ports::WorkflowTemplateRepository;
use autoflow_domain::error::AutoflowError;
use autoflow_domain::id::{OwnerId, TemplateId};
use autoflow_domain::schedule::Schedule;
use autoflow_domain::workflow::{WorkflowKind, WorkflowTemplate};

use crate::codec::{decode_err, decode_json, decode_parsed, decode_ts, encode_ts};
use crate::error::StorageError;

struct Wrapper(WorkflowTemplate);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let owner_id: uuid::Uuid = row.try_get("owner_id")?;
        let kind: String = row.try_get("kind")?;
        let steps: String = row.try_get("steps")?;
        let schedule: Option<String> = row.try_get("schedule")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self(WorkflowTemplate {
            id: TemplateId::from_uuid(id),
            owner_id: OwnerId::from_uuid(owner_id),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            kind: decode_parsed::<WorkflowKind>(&kind)?,
            steps: decode_json(&steps)?,
            schedule: schedule
                .map(|expr| Schedule::parse(expr).map_err(decode_err))
                .transpose()?,
            created_at: decode_ts(&created_at)?,
            updated_at: decode_ts(&updated_at)?,
        }))
    }
}

/// `SQLite`-backed workflow template repository.
pub struct SqliteWorkflowTemplateRepository {
    pool: SqlitePool,
}

impl SqliteWorkflowTemplateRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl WorkflowTemplateRepository for SqliteWorkflowTemplateRepository {
    async fn save(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate, AutoflowError> {
        let steps = serde_json::to_string(&template.steps).map_err(StorageError::from)?;

        sqlx::query(
            r"INSERT INTO workflow_templates (
                id, owner_id, name, description, kind, steps, schedule, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                kind = excluded.kind,
                steps = excluded.steps,
                schedule = excluded.schedule,
                updated_at = excluded.updated_at",
        )
        .bind(template.id.as_uuid())
        .bind(template.owner_id.as_uuid())
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.kind.as_str())
        .bind(&steps)
        .bind(template.schedule.as_ref().map(Schedule::expression))
        .bind(encode_ts(template.created_at))
        .bind(encode_ts(template.updated_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(template)
    }

    async fn get(&self, id: TemplateId) -> Result<Option<WorkflowTemplate>, AutoflowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM workflow_templates WHERE id = ?")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list(&self) -> Result<Vec<WorkflowTemplate>, AutoflowError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM workflow_templates ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn delete(&self, id: TemplateId) -> Result<(), AutoflowError> {
        sqlx::query("DELETE FROM workflow_templates WHERE id = ?")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
