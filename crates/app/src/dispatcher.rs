//! Event dispatcher — feeds the event source into the automation engine.
//!
//! Each event is handled on its own task so that independent events make
//! progress concurrently. On shutdown the dispatcher stops accepting
//! events and waits for in-flight runs to reach a terminal state.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::automation_engine::AutomationEngine;
use crate::ports::{
    EventSubscription, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};

/// Long-running consumer of an [`EventSubscription`].
pub struct EventDispatcher<R, W, L, P> {
    engine: Arc<AutomationEngine<R, W, L, P>>,
}

impl<R, W, L, P> EventDispatcher<R, W, L, P>
where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync + 'static,
    P: NoticePublisher + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AutomationEngine<R, W, L, P>>) -> Self {
        Self { engine }
    }

    /// Dispatch events until `shutdown` is cancelled or the source closes.
    pub async fn run(self, mut subscription: EventSubscription, shutdown: CancellationToken) {
        tracing::info!("event dispatcher started");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                next = subscription.next() => {
                    let Some(event) = next else {
                        tracing::info!("event source closed");
                        break;
                    };
                    let engine = Arc::clone(&self.engine);
                    in_flight.spawn(async move {
                        if let Err(err) = engine.process_event(&event).await {
                            tracing::error!(event_id = %event.id, error = %err, "event processing failed");
                        }
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "event task panicked");
                    }
                }
            }
        }

        tracing::info!(in_flight = in_flight.len(), "event dispatcher draining");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "event task panicked");
            }
        }
        tracing::info!("event dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::event::{DedupKey, Event};
    use autoflow_domain::rule::{ActionSpec, AutomationRule, RuleStatus, TriggerType};
    use autoflow_domain::run::RunStatus;

    use crate::event_queue::InProcessEventQueue;
    use crate::ledger::InMemoryRunLedger;
    use crate::ports::{EventSink, EventSource};
    use crate::settings::EngineSettings;
    use crate::test_support::{
        FakeCollaborators, InMemoryRuleRepo, InMemoryTemplateRepo, SpyPublisher,
    };

    fn rule(trigger_type: TriggerType) -> AutomationRule {
        AutomationRule::builder()
            .name("notify")
            .trigger_type(trigger_type)
            .status(RuleStatus::Active)
            .action(ActionSpec::SendNotification {
                recipient: "owner".into(),
                message: "hi".into(),
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_process_emitted_events_until_shutdown() {
        let collaborators = Arc::new(FakeCollaborators::default());
        let ledger = Arc::new(InMemoryRunLedger::new());
        let engine = Arc::new(AutomationEngine::new(
            InMemoryRuleRepo::with(vec![rule(TriggerType::ClientCreated)]),
            InMemoryTemplateRepo::with(vec![]),
            Arc::clone(&ledger),
            Arc::new(SpyPublisher::default()),
            FakeCollaborators::registry(&collaborators),
            EngineSettings::default(),
        ));
        let queue = InProcessEventQueue::new(16);
        let subscription = queue.subscribe(&TriggerType::EXTERNAL);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(EventDispatcher::new(engine).run(subscription, shutdown.clone()));

        queue.emit(Event::new(
            TriggerType::ClientCreated,
            serde_json::json!({}),
            DedupKey::new("client-1"),
        ))
        .unwrap();

        loop {
            let runs = ledger.list_recent(10).await.unwrap();
            if runs.first().is_some_and(|r| r.status == RunStatus::Succeeded) {
                break;
            }
            tokio::task::yield_now().await;
        }
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(collaborators.calls().len(), 1);
    }

    #[tokio::test]
    async fn should_stop_when_event_source_closes() {
        let engine = Arc::new(AutomationEngine::new(
            InMemoryRuleRepo::with(vec![]),
            InMemoryTemplateRepo::with(vec![]),
            Arc::new(InMemoryRunLedger::new()),
            Arc::new(SpyPublisher::default()),
            crate::handlers::HandlerRegistry::new(),
            EngineSettings::default(),
        ));
        let queue = InProcessEventQueue::new(4);
        let subscription = queue.subscribe(&TriggerType::EXTERNAL);
        drop(queue);

        EventDispatcher::new(engine)
            .run(subscription, CancellationToken::new())
            .await;
    }
}
