//! # autoflow-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the storage port traits defined in `autoflow-app::ports`:
//!   `RuleRepository`, `WorkflowTemplateRepository` and `RunLedgerStore`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows; structured fields
//!   (conditions, actions, steps, step results) are stored as JSON
//!
//! The ledger's at-most-one-open-run guarantee rests on a partial unique
//! index over `(owner, dedup_key)` restricted to non-terminal statuses.
//!
//! ## Dependency rule
//! Depends on `autoflow-app` (for port traits) and `autoflow-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod rule_repo;
pub mod run_ledger;
pub mod workflow_repo;

mod codec;

pub use pool::{Config, Database};
pub use rule_repo::SqliteRuleRepository;
pub use run_ledger::SqliteRunLedger;
pub use workflow_repo::SqliteWorkflowTemplateRepository;
