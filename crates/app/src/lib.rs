//! # autoflow-app
//!
//! Application layer — use-cases, orchestration and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `RuleRepository` — rule storage, the sole source of rule truth
//!   - `WorkflowTemplateRepository` — template storage
//!   - `RunLedgerStore` — atomic run registration and completion
//!   - `EventSource` / `EventSink` — inbound event queue
//!   - `NoticePublisher` — outbound realtime notices
//!   - one collaborator port per side-effecting action type
//! - Provide the engine:
//!   - `TriggerMatcher` — event → matching rules, deterministic order
//!   - `ActionExecutor` — handler dispatch, timeouts, bounded retries
//!   - `WorkflowEngine` — sequential, parallel and conditional execution
//!   - `AutomationEngine` — ledgered runs: `process_event`, `run_rule`,
//!     `run_workflow`, `get_run_status`
//!   - `EventDispatcher` and `Scheduler` — the long-running drivers
//! - Define **driving/inbound** use-cases (`RuleService`, `WorkflowService`)
//! - Provide **in-process infrastructure** that doesn't need IO (event queue,
//!   notice bus, in-memory run ledger)
//!
//! ## Dependency rule
//! Depends on `autoflow-domain` only (plus `tokio` for channels, timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod automation_engine;
pub mod dispatcher;
pub mod event_bus;
pub mod event_queue;
pub mod executor;
pub mod handlers;
pub mod ledger;
pub mod matcher;
pub mod ports;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod workflow_engine;

#[cfg(test)]
mod test_support;
