//! Scheduler — originates runs for time-based rules and templates.
//!
//! Every tick looks at the slots of each schedule that fell in
//! `(last_tick, now]` and fires them under a dedup key derived from the
//! owner and the slot. The ledger keeps `schedule:` keys unique whatever
//! the run's status, so a slot observed twice (a recovered tick, a
//! restart, two scheduler instances) still runs once. The tick also reaps
//! runs that outlived their budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use autoflow_domain::error::AutoflowError;
use autoflow_domain::event::{DedupKey, Event};
use autoflow_domain::id::TemplateId;
use autoflow_domain::rule::{AutomationRule, TriggerType};
use autoflow_domain::run::{ExecutionRun, RunOwner};
use autoflow_domain::time::{Timestamp, now};

use crate::automation_engine::AutomationEngine;
use crate::ports::{NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository};

/// Tick cadence and catch-up window.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick: Duration,
    /// Slots older than this at tick time are dropped instead of fired.
    pub max_catch_up: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            max_catch_up: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
enum Due {
    Rule(AutomationRule),
    Template(TemplateId),
}

#[derive(Debug)]
struct Firing {
    due: Due,
    slot: Timestamp,
}

impl Firing {
    fn owner(&self) -> RunOwner {
        match &self.due {
            Due::Rule(rule) => RunOwner::Rule(rule.id),
            Due::Template(id) => RunOwner::Template(*id),
        }
    }
}

/// Fires scheduled rules and templates through the automation engine.
pub struct Scheduler<R, W, L, P> {
    engine: Arc<AutomationEngine<R, W, L, P>>,
    rules: Arc<R>,
    templates: Arc<W>,
    settings: SchedulerSettings,
}

impl<R, W, L, P> Scheduler<R, W, L, P>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
{
    pub fn new(
        engine: Arc<AutomationEngine<R, W, L, P>>,
        rules: Arc<R>,
        templates: Arc<W>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            rules,
            templates,
            settings,
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// The first tick looks back over the whole catch-up window, so slots
    /// missed while the process was down still fire.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(tick = ?self.settings.tick, "scheduler started");
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let started = now();
        let mut last_tick = started
            .checked_sub_signed(self.catch_up())
            .unwrap_or(started);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let current = now();
                    if let Err(err) = self.tick(last_tick, current).await {
                        tracing::error!(error = %err, "scheduler tick failed");
                    }
                    last_tick = current;
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Fire every slot in `(last_tick, now]` and reap overdue runs.
    ///
    /// Returns the runs started by this tick. Slots that already have a
    /// run in the ledger are skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error if schedules cannot be loaded or the reaper
    /// fails. Failures of individual firings are logged.
    #[tracing::instrument(skip(self))]
    pub async fn tick(
        &self,
        last_tick: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<ExecutionRun>, AutoflowError> {
        self.engine.expire_overdue(now).await?;

        let floor = now.checked_sub_signed(self.catch_up()).unwrap_or(last_tick);
        let after = last_tick.max(floor);

        let mut firings = Vec::new();
        for rule in self
            .rules
            .list_active_by_trigger_type(TriggerType::Scheduled)
            .await?
        {
            if let Some(schedule) = &rule.schedule {
                for slot in schedule.slots_between(after, now) {
                    firings.push(Firing {
                        due: Due::Rule(rule.clone()),
                        slot,
                    });
                }
            }
        }
        for template in self.templates.list().await? {
            if let Some(schedule) = &template.schedule {
                firings.extend(schedule.slots_between(after, now).into_iter().map(|slot| {
                    Firing {
                        due: Due::Template(template.id),
                        slot,
                    }
                }));
            }
        }
        tracing::debug!(slots = firings.len(), "scheduled slots due");

        let mut tasks = JoinSet::new();
        for firing in firings {
            let engine = Arc::clone(&self.engine);
            tasks.spawn(async move { fire(&engine, firing).await });
        }
        let mut started = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(run)) => started.push(run),
                Ok(None) => {}
                Err(err) => tracing::error!(error = %err, "scheduled firing panicked"),
            }
        }
        Ok(started)
    }

    fn catch_up(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.max_catch_up).unwrap_or(chrono::Duration::MAX)
    }
}

async fn fire<R, W, L, P>(
    engine: &AutomationEngine<R, W, L, P>,
    firing: Firing,
) -> Option<ExecutionRun>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync,
    P: NoticePublisher + Send + Sync,
{
    let owner = firing.owner();
    let key = DedupKey::scheduled(owner.id(), firing.slot);
    let payload = serde_json::json!({ "scheduled_for": firing.slot });
    let result = match firing.due {
        Due::Rule(rule) => {
            let event = Event::new(TriggerType::Scheduled, payload, key).with_owner(rule.owner_id);
            engine.fire_scheduled_rule(rule, event).await
        }
        Due::Template(template_id) => engine
            .run_workflow_keyed(template_id, payload, key)
            .await
            .map(Some),
    };
    match result {
        Ok(run) => run,
        Err(AutoflowError::DuplicateRun(dup)) => {
            tracing::debug!(%owner, existing_run = %dup.existing_run, "slot already fired");
            None
        }
        Err(err) => {
            tracing::error!(%owner, error = %err, "scheduled run failed to start");
            None
        }
    }
}
