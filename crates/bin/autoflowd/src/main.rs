//! # autoflowd — autoflow daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`autoflow.toml`, environment overrides)
//! - Initialize logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository and ledger implementations (adapters)
//! - Construct the automation engine and services, injecting adapters via
//!   port traits
//! - Spawn the event dispatcher and the scheduler
//! - Build the axum router, bind to a TCP port and serve
//! - Handle graceful shutdown: stop intake, let in-flight runs finish
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use autoflow_adapter_http_axum::state::AppState;
use autoflow_adapter_storage_sqlite_sqlx::{
    SqliteRuleRepository, SqliteRunLedger, SqliteWorkflowTemplateRepository,
};
use autoflow_adapter_virtual::VirtualCollaborators;
use autoflow_app::automation_engine::AutomationEngine;
use autoflow_app::dispatcher::EventDispatcher;
use autoflow_app::event_bus::InProcessEventBus;
use autoflow_app::event_queue::InProcessEventQueue;
use autoflow_app::ports::{
    EventSource, NoticePublisher, RuleRepository, RunLedgerStore, WorkflowTemplateRepository,
};
use autoflow_app::scheduler::Scheduler;
use autoflow_app::services::rule_service::RuleService;
use autoflow_app::services::workflow_service::WorkflowService;
use autoflow_domain::event::Notice;
use autoflow_domain::rule::TriggerType;
use autoflow_domain::time::now;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let mut db_config = autoflow_adapter_storage_sqlite_sqlx::Config::new(config.database_url());
    db_config.max_connections = config.database.max_connections;
    let db = db_config.build().await?;
    let pool = db.pool().clone();

    // Repositories
    let rules = Arc::new(SqliteRuleRepository::new(pool.clone()));
    let templates = Arc::new(SqliteWorkflowTemplateRepository::new(pool.clone()));
    let ledger = Arc::new(SqliteRunLedger::new(pool));

    // Buses
    let events = Arc::new(InProcessEventQueue::new(config.bus.capacity));
    let notices = Arc::new(InProcessEventBus::<Notice>::new(config.bus.capacity));

    // Engine and services
    let collaborators = VirtualCollaborators::default();
    let engine = Arc::new(AutomationEngine::new(
        Arc::clone(&rules),
        Arc::clone(&templates),
        ledger,
        Arc::clone(&notices),
        collaborators.registry(),
        config.engine.to_settings(),
    ));
    let rule_service = Arc::new(RuleService::new(
        Arc::clone(&rules),
        Arc::clone(&templates),
        Arc::clone(&notices),
    ));
    let workflow_service = Arc::new(WorkflowService::new(
        Arc::clone(&templates),
        Arc::clone(&rules),
        Arc::clone(&notices),
    ));

    // Background tasks
    let shutdown = CancellationToken::new();
    let subscription = EventSource::subscribe(&*events, &TriggerType::EXTERNAL);
    let dispatcher = tokio::spawn(
        EventDispatcher::new(Arc::clone(&engine)).run(subscription, shutdown.clone()),
    );
    let scheduler = if config.scheduler.enabled {
        tokio::spawn(
            Scheduler::new(
                Arc::clone(&engine),
                rules,
                templates,
                config.scheduler.to_settings(),
            )
            .run(shutdown.clone()),
        )
    } else {
        tracing::info!("scheduler disabled, only reaping overdue runs");
        tokio::spawn(reap_overdue(
            Arc::clone(&engine),
            Duration::from_secs(config.scheduler.tick_secs),
            shutdown.clone(),
        ))
    };

    // HTTP
    let state = AppState::new(engine, rule_service, workflow_service, events, notices);
    let app = autoflow_adapter_http_axum::router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "autoflowd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Covers the server stopping on its own.
    shutdown.cancel();
    if let Err(err) = dispatcher.await {
        tracing::error!(error = %err, "event dispatcher task failed");
    }
    if let Err(err) = scheduler.await {
        tracing::error!(error = %err, "scheduler task failed");
    }
    tracing::info!("autoflowd stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
    shutdown.cancel();
}

async fn reap_overdue<R, W, L, P>(
    engine: Arc<AutomationEngine<R, W, L, P>>,
    every: Duration,
    shutdown: CancellationToken,
) where
    R: RuleRepository + Send + Sync + 'static,
    W: WorkflowTemplateRepository + Send + Sync + 'static,
    L: RunLedgerStore + Send + Sync,
    P: NoticePublisher + Send + Sync,
{
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(err) = engine.expire_overdue(now()).await {
                    tracing::error!(error = %err, "failed to reap overdue runs");
                }
            }
        }
    }
}
