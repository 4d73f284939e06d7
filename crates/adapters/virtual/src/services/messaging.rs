//! Virtual notification and email delivery.

use std::sync::{Arc, Mutex};

use autoflow_app::ports::{EmailService, NotificationService};
use autoflow_domain::error::ActionError;

use super::{Journal, lock};

/// One message accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
struct Outbox {
    journal: Journal<()>,
    delivered: Arc<Mutex<Vec<Delivery>>>,
}

impl Outbox {
    fn deliver(&self, idempotency_key: &str, delivery: Delivery) -> bool {
        let (_, fresh) = self.journal.once(idempotency_key, || {
            lock(&self.delivered).push(delivery);
        });
        fresh
    }

    fn delivered(&self) -> Vec<Delivery> {
        lock(&self.delivered).clone()
    }
}

/// In-app notifications, kept in memory.
#[derive(Debug, Clone, Default)]
pub struct VirtualNotifier {
    outbox: Outbox,
}

impl VirtualNotifier {
    /// Notifications delivered so far, oldest first.
    #[must_use]
    pub fn delivered(&self) -> Vec<Delivery> {
        self.outbox.delivered()
    }
}

impl NotificationService for VirtualNotifier {
    async fn send(
        &self,
        recipient: &str,
        message: &str,
        idempotency_key: &str,
    ) -> Result<(), ActionError> {
        if recipient.trim().is_empty() {
            return Err(ActionError::permanent("notification recipient is empty"));
        }
        let delivery = Delivery {
            to: recipient.to_string(),
            subject: None,
            body: message.to_string(),
        };
        if self.outbox.deliver(idempotency_key, delivery) {
            tracing::info!(recipient, idempotency_key, "notification delivered");
        } else {
            tracing::debug!(idempotency_key, "notification already delivered");
        }
        Ok(())
    }
}

/// Outgoing email, kept in memory.
#[derive(Debug, Clone, Default)]
pub struct VirtualMailer {
    outbox: Outbox,
}

impl VirtualMailer {
    /// Emails sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Delivery> {
        self.outbox.delivered()
    }
}

impl EmailService for VirtualMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        idempotency_key: &str,
    ) -> Result<(), ActionError> {
        if !to.contains('@') {
            return Err(ActionError::permanent(format!(
                "invalid email address `{to}`"
            )));
        }
        let delivery = Delivery {
            to: to.to_string(),
            subject: Some(subject.to_string()),
            body: body.to_string(),
        };
        if self.outbox.deliver(idempotency_key, delivery) {
            tracing::info!(to, subject, idempotency_key, "email sent");
        } else {
            tracing::debug!(idempotency_key, "email already sent");
        }
        Ok(())
    }
}
