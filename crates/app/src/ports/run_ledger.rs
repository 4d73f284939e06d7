//! Run ledger port — idempotency, audit and retry bookkeeping.

use std::future::Future;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::DedupKey;
use autoflow_domain::id::RunId;
use autoflow_domain::run::{ExecutionRun, RunFailure, RunOwner, RunStatus, StepResult};
use autoflow_domain::time::Timestamp;

/// Store of [`ExecutionRun`]s.
///
/// [`begin`](Self::begin) is the linearization point of the at-most-once
/// guarantee: it must check for a conflicting run with the same
/// `(owner, dedup_key)` and insert the new one in a single atomic step. A
/// run conflicts while it is non-terminal, or in any status when the key
/// is a scheduled-slot key ([`DedupKey::is_scheduled`]).
pub trait RunLedgerStore {
    /// Register a new `pending` run.
    ///
    /// Fails with [`AutoflowError::DuplicateRun`] when a conflicting run
    /// already exists for the same owner and key.
    fn begin(
        &self,
        owner: RunOwner,
        dedup_key: DedupKey,
        budget: chrono::Duration,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send;

    /// `pending → running`.
    fn mark_running(&self, id: RunId) -> impl Future<Output = Result<(), AutoflowError>> + Send;

    /// Move a run to its terminal state.
    ///
    /// Fails with [`AutoflowError::Integrity`] when the run is already
    /// terminal (for example because it was reaped as overdue).
    fn complete(
        &self,
        id: RunId,
        status: RunStatus,
        step_results: Vec<StepResult>,
        failure: Option<RunFailure>,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send;

    fn get(
        &self,
        id: RunId,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send;

    /// Most recent run for `(owner, dedup_key)`, whatever its status.
    fn find_by_key(
        &self,
        owner: RunOwner,
        dedup_key: &DedupKey,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send;

    /// Newest runs first.
    fn list_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send;

    /// Force every non-terminal run whose deadline is before `now` to
    /// `failed` with a [`RunFailure::RunTimedOut`] marker.
    fn expire_overdue(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send;
}

impl<T: RunLedgerStore + Send + Sync> RunLedgerStore for std::sync::Arc<T> {
    fn begin(
        &self,
        owner: RunOwner,
        dedup_key: DedupKey,
        budget: chrono::Duration,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send {
        (**self).begin(owner, dedup_key, budget)
    }

    fn mark_running(&self, id: RunId) -> impl Future<Output = Result<(), AutoflowError>> + Send {
        (**self).mark_running(id)
    }

    fn complete(
        &self,
        id: RunId,
        status: RunStatus,
        step_results: Vec<StepResult>,
        failure: Option<RunFailure>,
    ) -> impl Future<Output = Result<ExecutionRun, AutoflowError>> + Send {
        (**self).complete(id, status, step_results, failure)
    }

    fn get(
        &self,
        id: RunId,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send {
        (**self).get(id)
    }

    fn find_by_key(
        &self,
        owner: RunOwner,
        dedup_key: &DedupKey,
    ) -> impl Future<Output = Result<Option<ExecutionRun>, AutoflowError>> + Send {
        (**self).find_by_key(owner, dedup_key)
    }

    fn list_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send {
        (**self).list_recent(limit)
    }

    fn expire_overdue(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ExecutionRun>, AutoflowError>> + Send {
        (**self).expire_overdue(now)
    }
}
