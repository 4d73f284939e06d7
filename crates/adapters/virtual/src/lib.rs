//! # autoflow-adapter-virtual
//!
//! Virtual collaborators that stand in for the external services an
//! automation talks to, for demos and end-to-end tests.
//!
//! ## Provided services
//!
//! | Port | Service | Behaviour |
//! |------|---------|-----------|
//! | `NotificationService` | [`VirtualNotifier`] | Records in-app notifications |
//! | `EmailService` | [`VirtualMailer`] | Records outgoing email, rejects addresses without `@` |
//! | `TaskService` | [`VirtualTaskBoard`] | Creates `task-<n>` records |
//! | `DocumentService` | [`VirtualDocumentStore`] | Creates `doc-<n>` records |
//! | `StatusService` | [`VirtualStatusStore`] | Keeps the last value written per field |
//! | `TextGenerationService` | [`VirtualTextGenerator`] | Returns a canned draft after a configurable latency |
//!
//! Every side-effecting service honours the idempotency key it is given:
//! a replayed key returns the original result and performs nothing.
//!
//! ## Dependency rule
//!
//! Depends on `autoflow-app` (port traits) and `autoflow-domain` only.

mod services;

use std::time::Duration;

use autoflow_app::handlers::HandlerRegistry;

pub use services::{
    Delivery, StoredDocument, VirtualDocumentStore, VirtualMailer, VirtualNotifier,
    VirtualStatusStore, VirtualTaskBoard, VirtualTextGenerator,
};

/// One handle on every virtual service.
///
/// Services are cheap to clone and clones share state, so a caller can keep
/// this bundle to inspect what the engine did through the registry.
#[derive(Debug, Clone, Default)]
pub struct VirtualCollaborators {
    pub notifications: VirtualNotifier,
    pub email: VirtualMailer,
    pub tasks: VirtualTaskBoard,
    pub documents: VirtualDocumentStore,
    pub status: VirtualStatusStore,
    pub text: VirtualTextGenerator,
}

impl VirtualCollaborators {
    /// Bundle whose text generator answers after `latency`.
    #[must_use]
    pub fn with_text_latency(latency: Duration) -> Self {
        Self {
            text: VirtualTextGenerator::with_latency(latency),
            ..Self::default()
        }
    }

    /// Handler registry wired to these services.
    #[must_use]
    pub fn registry(&self) -> HandlerRegistry {
        HandlerRegistry::standard(
            self.notifications.clone(),
            self.email.clone(),
            self.tasks.clone(),
            self.documents.clone(),
            self.status.clone(),
            self.text.clone(),
        )
    }
}
