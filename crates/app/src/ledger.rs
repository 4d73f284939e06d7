//! In-memory [`RunLedgerStore`].
//!
//! Suitable for a single process and for tests. The check-and-insert of
//! [`begin`](RunLedgerStore::begin) happens under one lock, which gives the
//! same guarantee as the partial unique indexes of the SQL adapter.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use autoflow_domain::error::{AutoflowError, DuplicateRunError, NotFoundError};
use autoflow_domain::event::DedupKey;
use autoflow_domain::id::RunId;
use autoflow_domain::run::{ExecutionRun, RunFailure, RunOwner, RunStatus, StepResult};
use autoflow_domain::time::Timestamp;

use crate::ports::RunLedgerStore;

/// Runs kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryRunLedger {
    runs: Mutex<Vec<ExecutionRun>>,
}

impl InMemoryRunLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionRun>> {
        // A panic while holding the lock cannot leave a half-written run.
        self.runs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn with_run<T>(
        &self,
        id: RunId,
        f: impl FnOnce(&mut ExecutionRun) -> Result<T, AutoflowError>,
    ) -> Result<T, AutoflowError> {
        let mut runs = self.lock();
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| NotFoundError {
                entity: "ExecutionRun",
                id: id.to_string(),
            })?;
        f(run)
    }
}

impl RunLedgerStore for InMemoryRunLedger {
    fn begin(
        &self,
        owner: RunOwner,
        dedup_key: DedupKey,
        budget: chrono::Duration,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send {
        let result: Result<ExecutionRun, AutoflowError> = {
            let mut runs = self.lock();
            let once_only = dedup_key.is_scheduled();
            if let Some(existing) = runs.iter().find(|r| {
                r.owner == owner && r.dedup_key == dedup_key && (once_only || !r.is_terminal())
            }) {
                Err(DuplicateRunError {
                    dedup_key: dedup_key.to_string(),
                    existing_run: existing.id.to_string(),
                }
                .into())
            } else {
                let run = ExecutionRun::pending(owner, dedup_key, budget);
                runs.push(run.clone());
                Ok(run)
            }
        };
        async { result }
    }

    fn mark_running(&self, id: RunId) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        let result = self.with_run(id, |run| run.start().map_err(Into::into));
        async { result }
    }

    fn complete(
        &self,
        id: RunId,
        status: RunStatus,
        step_results: Vec<StepResult>,
        failure: Option<RunFailure>,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send {
        let result = self.with_run(id, |run| {
            run.complete(status, step_results, failure)?;
            Ok(run.clone())
        });
        async { result }
    }

    fn get(
        &self,
        id: RunId,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send {
        let result = self.lock().iter().find(|r| r.id == id).cloned();
        async { Ok(result) }
    }

    fn find_by_key(
        &self,
        owner: RunOwner,
        dedup_key: &DedupKey,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send {
        let result = self
            .lock()
            .iter()
            .rev()
            .find(|r| r.owner == owner && &r.dedup_key == dedup_key)
            .cloned();
        async { Ok(result) }
    }

    fn list_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send {
        let result: Vec<_> = self.lock().iter().rev().take(limit).cloned().collect();
        async { Ok(result) }
    }

    fn expire_overdue(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send {
        let mut expired = Vec::new();
        for run in self.lock().iter_mut().filter(|r| r.is_overdue(now)) {
            let budget_secs = (run.deadline - run.started_at).num_seconds().unsigned_abs();
            let steps = std::mem::take(&mut run.step_results);
            if run
                .complete(
                    RunStatus::Failed,
                    steps,
                    Some(RunFailure::RunTimedOut { budget_secs }),
                )
                .is_ok()
            {
                expired.push(run.clone());
            }
        }
        async { Ok(expired) }
    }
}
