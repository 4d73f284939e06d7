//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod collaborators;
pub mod event_bus;
pub mod event_source;
pub mod rule_repo;
pub mod run_ledger;
pub mod workflow_repo;

pub use collaborators::{
    DocumentService, EmailService, NewTask, NotificationService, StatusService, TaskService,
    TextGenerationService,
};
pub use event_bus::NoticePublisher;
pub use event_source::{EventSink, EventSource, EventSubscription};
pub use rule_repo::RuleRepository;
pub use run_ledger::RunLedgerStore;
pub use workflow_repo::WorkflowTemplateRepository;
