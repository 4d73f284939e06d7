//! `SQLite` implementation of [`RunLedgerStore`].
//!
//! The partial unique index `idx_execution_runs_open_key` rejects a second
//! open run for the same `(owner, dedup_key)`, and
//! `idx_execution_runs_scheduled_key` rejects any second run of a scheduled
//! slot, so [`begin`] stays atomic across connections and processes. Terminal transitions are guarded
//! `UPDATE`s that only match open rows: a run reaped as overdue cannot be
//! completed again by the task that was still driving it.
//!
//! [`begin`]: RunLedgerStore::begin

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use autoflow_app::ports::RunLedgerStore;
use autoflow_domain::error::{
    AutoflowError, DuplicateRunError, IntegrityViolation, NotFoundError,
};
use autoflow_domain::event::DedupKey;
use autoflow_domain::id::RunId;
use autoflow_domain::run::{ExecutionRun, RunFailure, RunOwner, RunStatus, StepResult};
use autoflow_domain::time::Timestamp;

use crate::codec::{decode_err, decode_json, decode_parsed, decode_ts, encode_ts};
use crate::error::{StorageError, is_unique_violation};

struct Wrapper(ExecutionRun);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let owner_kind: String = row.try_get("owner_kind")?;
        let owner_id: uuid::Uuid = row.try_get("owner_id")?;
        let dedup_key: String = row.try_get("dedup_key")?;
        let status: String = row.try_get("status")?;
        let step_results: String = row.try_get("step_results")?;
        let failure: Option<String> = row.try_get("failure")?;
        let started_at: String = row.try_get("started_at")?;
        let finished_at: Option<String> = row.try_get("finished_at")?;
        let deadline: String = row.try_get("deadline")?;

        Ok(Self(ExecutionRun {
            id: RunId::from_uuid(id),
            owner: RunOwner::parse(&owner_kind, &owner_id.to_string()).map_err(decode_err)?,
            dedup_key: DedupKey::new(dedup_key),
            status: decode_parsed::<RunStatus>(&status)?,
            step_results: decode_json(&step_results)?,
            failure: failure.as_deref().map(decode_json).transpose()?,
            started_at: decode_ts(&started_at)?,
            finished_at: finished_at.as_deref().map(decode_ts).transpose()?,
            deadline: decode_ts(&deadline)?,
        }))
    }
}

/// `SQLite`-backed run ledger.
pub struct SqliteRunLedger {
    pool: SqlitePool,
}

impl SqliteRunLedger {
    /// Create a new ledger backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: RunId) -> Result<Option<ExecutionRun>, StorageError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM execution_runs WHERE id = ?")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|w| w.0))
    }

    /// Run that made `begin` hit a unique index: the open one if any,
    /// otherwise the latest (scheduled-slot keys conflict in any status).
    async fn conflicting_run_id(
        &self,
        owner: RunOwner,
        dedup_key: &DedupKey,
    ) -> Result<Option<uuid::Uuid>, StorageError> {
        let row: Option<(uuid::Uuid,)> = sqlx::query_as(
            r"SELECT id FROM execution_runs
            WHERE owner_kind = ? AND owner_id = ? AND dedup_key = ?
            ORDER BY status IN ('pending', 'running') DESC, started_at DESC
            LIMIT 1",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .bind(dedup_key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Persist a terminal run. Returns `false` when the row was no longer
    /// open.
    async fn store_terminal(&self, run: &ExecutionRun) -> Result<bool, StorageError> {
        let step_results = serde_json::to_string(&run.step_results)?;
        let failure = run.failure.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r"UPDATE execution_runs
            SET status = ?, step_results = ?, failure = ?, finished_at = ?
            WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(run.status.as_str())
        .bind(&step_results)
        .bind(failure)
        .bind(run.finished_at.map(encode_ts))
        .bind(run.id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn not_found(id: RunId) -> AutoflowError {
    NotFoundError {
        entity: "ExecutionRun",
        id: id.to_string(),
    }
    .into()
}

fn already_terminal(id: RunId) -> AutoflowError {
    IntegrityViolation::RunAlreadyTerminal(id.to_string()).into()
}

impl RunLedgerStore for SqliteRunLedger {
    async fn begin(
        &self,
        owner: RunOwner,
        dedup_key: DedupKey,
        budget: chrono::Duration,
    ) -> Result<ExecutionRun, AutoflowError> {
        let run = ExecutionRun::pending(owner, dedup_key, budget);

        let inserted = sqlx::query(
            r"INSERT INTO execution_runs (
                id, owner_kind, owner_id, dedup_key, status, step_results, started_at, deadline
            )
            VALUES (?, ?, ?, ?, ?, '[]', ?, ?)",
        )
        .bind(run.id.as_uuid())
        .bind(owner.kind())
        .bind(owner.id())
        .bind(run.dedup_key.as_str())
        .bind(run.status.as_str())
        .bind(encode_ts(run.started_at))
        .bind(encode_ts(run.deadline))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(run),
            Err(err) if is_unique_violation(&err) => {
                let existing = self.conflicting_run_id(owner, &run.dedup_key).await?;
                Err(DuplicateRunError {
                    dedup_key: run.dedup_key.to_string(),
                    existing_run: existing.map(|id| id.to_string()).unwrap_or_default(),
                }
                .into())
            }
            Err(err) => Err(StorageError::from(err).into()),
        }
    }

    async fn mark_running(&self, id: RunId) -> Result<(), AutoflowError> {
        let result = sqlx::query(
            "UPDATE execution_runs SET status = 'running' WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.fetch(id).await? {
            Some(_) => Err(already_terminal(id)),
            None => Err(not_found(id)),
        }
    }

    async fn complete(
        &self,
        id: RunId,
        status: RunStatus,
        step_results: Vec<StepResult>,
        failure: Option<RunFailure>,
    ) -> Result<ExecutionRun, AutoflowError> {
        let mut run = self.fetch(id).await?.ok_or_else(|| not_found(id))?;
        run.complete(status, step_results, failure)?;
        if self.store_terminal(&run).await? {
            Ok(run)
        } else {
            Err(already_terminal(id))
        }
    }

    async fn get(&self, id: RunId) -> Result<Option<ExecutionRun>, AutoflowError> {
        Ok(self.fetch(id).await?)
    }

    async fn find_by_key(
        &self,
        owner: RunOwner,
        dedup_key: &DedupKey,
    ) -> Result<Option<ExecutionRun>, AutoflowError> {
        let row: Option<Wrapper> = sqlx::query_as(
            r"SELECT * FROM execution_runs
            WHERE owner_kind = ? AND owner_id = ? AND dedup_key = ?
            ORDER BY started_at DESC, rowid DESC
            LIMIT 1",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .bind(dedup_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionRun>, AutoflowError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM execution_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn expire_overdue(&self, now: Timestamp) -> Result<Vec<ExecutionRun>, AutoflowError> {
        let overdue: Vec<Wrapper> = sqlx::query_as(
            r"SELECT * FROM execution_runs
            WHERE status IN ('pending', 'running') AND deadline < ?
            ORDER BY started_at",
        )
        .bind(encode_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        let mut expired = Vec::with_capacity(overdue.len());
        for Wrapper(mut run) in overdue {
            let budget_secs = (run.deadline - run.started_at).num_seconds().unsigned_abs();
            let steps = std::mem::take(&mut run.step_results);
            if run
                .complete(
                    RunStatus::Failed,
                    steps,
                    Some(RunFailure::RunTimedOut { budget_secs }),
                )
                .is_err()
            {
                continue;
            }
            // Completed concurrently by its driver: nothing to reap.
            if self.store_terminal(&run).await? {
                expired.push(run);
            }
        }
        Ok(expired)
    }
}
