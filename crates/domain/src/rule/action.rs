//! Action — a single externally visible side effect.
//!
//! Parameters are a schema-validated tagged variant per action type, so
//! malformed parameters are rejected when a rule or template is saved
//! rather than when it runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::TemplateId;

/// Registry key of an action handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendNotification,
    SendEmail,
    CreateTask,
    CreateDocument,
    UpdateStatus,
    InvokeAi,
    RunWorkflow,
}

impl ActionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendNotification => "send_notification",
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::CreateDocument => "create_document",
            Self::UpdateStatus => "update_status",
            Self::InvokeAi => "invoke_ai",
            Self::RunWorkflow => "run_workflow",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action and its parameters.
///
/// String parameters may contain `{{path}}` placeholders rendered from the
/// triggering event payload (see [`ActionSpec::render`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    SendNotification {
        recipient: String,
        message: String,
    },
    SendEmail {
        to: String,
        subject: String,
        body: String,
    },
    CreateTask {
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        assignee: Option<String>,
        #[serde(default)]
        due_in_days: Option<u32>,
    },
    CreateDocument {
        title: String,
        #[serde(default)]
        content: String,
    },
    UpdateStatus {
        /// Kind of domain entity, e.g. `"proposal"`.
        entity: String,
        entity_id: String,
        field: String,
        value: String,
    },
    InvokeAi {
        prompt: String,
        /// Overrides the configured generation timeout.
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// Execute another workflow template inline.
    RunWorkflow { template_id: TemplateId },
}

impl ActionSpec {
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendNotification { .. } => ActionType::SendNotification,
            Self::SendEmail { .. } => ActionType::SendEmail,
            Self::CreateTask { .. } => ActionType::CreateTask,
            Self::CreateDocument { .. } => ActionType::CreateDocument,
            Self::UpdateStatus { .. } => ActionType::UpdateStatus,
            Self::InvokeAi { .. } => ActionType::InvokeAi,
            Self::RunWorkflow { .. } => ActionType::RunWorkflow,
        }
    }

    /// The workflow template this action runs, if any.
    #[must_use]
    pub fn referenced_template(&self) -> Option<TemplateId> {
        match self {
            Self::RunWorkflow { template_id } => Some(*template_id),
            _ => None,
        }
    }

    /// Check required parameters are present.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyParameter`] naming the first blank
    /// required field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let action = self.action_type().as_str();
        let required: Vec<(&'static str, &str)> = match self {
            Self::SendNotification { recipient, message } => {
                vec![("recipient", recipient.as_str()), ("message", message.as_str())]
            }
            Self::SendEmail { to, subject, .. } => {
                vec![("to", to.as_str()), ("subject", subject.as_str())]
            }
            Self::CreateTask { title, .. } | Self::CreateDocument { title, .. } => {
                vec![("title", title.as_str())]
            }
            Self::UpdateStatus {
                entity,
                entity_id,
                field,
                ..
            } => vec![
                ("entity", entity.as_str()),
                ("entity_id", entity_id.as_str()),
                ("field", field.as_str()),
            ],
            Self::InvokeAi { prompt, .. } => vec![("prompt", prompt.as_str())],
            Self::RunWorkflow { .. } => vec![],
        };
        match required.into_iter().find(|(_, v)| v.trim().is_empty()) {
            Some((field, _)) => Err(ValidationError::EmptyParameter { action, field }),
            None => Ok(()),
        }
    }

    /// Substitute `{{path}}` placeholders with values from `payload`.
    ///
    /// Missing paths render as the empty string; string values are
    /// inserted without quotes, other JSON values in their compact form.
    #[must_use]
    pub fn render(&self, payload: &serde_json::Value) -> Self {
        let r = |s: &String| interpolate(s, payload);
        match self {
            Self::SendNotification { recipient, message } => Self::SendNotification {
                recipient: r(recipient),
                message: r(message),
            },
            Self::SendEmail { to, subject, body } => Self::SendEmail {
                to: r(to),
                subject: r(subject),
                body: r(body),
            },
            Self::CreateTask {
                title,
                description,
                assignee,
                due_in_days,
            } => Self::CreateTask {
                title: r(title),
                description: description.as_ref().map(r),
                assignee: assignee.as_ref().map(r),
                due_in_days: *due_in_days,
            },
            Self::CreateDocument { title, content } => Self::CreateDocument {
                title: r(title),
                content: r(content),
            },
            Self::UpdateStatus {
                entity,
                entity_id,
                field,
                value,
            } => Self::UpdateStatus {
                entity: r(entity),
                entity_id: r(entity_id),
                field: r(field),
                value: r(value),
            },
            Self::InvokeAi {
                prompt,
                timeout_secs,
            } => Self::InvokeAi {
                prompt: r(prompt),
                timeout_secs: *timeout_secs,
            },
            Self::RunWorkflow { template_id } => Self::RunWorkflow {
                template_id: *template_id,
            },
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendNotification { recipient, .. } => write!(f, "send_notification({recipient})"),
            Self::SendEmail { to, .. } => write!(f, "send_email({to})"),
            Self::CreateTask { title, .. } => write!(f, "create_task({title})"),
            Self::CreateDocument { title, .. } => write!(f, "create_document({title})"),
            Self::UpdateStatus {
                entity,
                entity_id,
                field,
                value,
            } => write!(f, "update_status({entity}/{entity_id}.{field}={value})"),
            Self::InvokeAi { .. } => f.write_str("invoke_ai"),
            Self::RunWorkflow { template_id } => write!(f, "run_workflow({template_id})"),
        }
    }
}

fn interpolate(text: &str, payload: &serde_json::Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = rest[start + 2..start + 2 + len].trim();
        match super::condition::lookup(payload, path) {
            Ok(Some(serde_json::Value::String(s))) => out.push_str(s),
            Ok(Some(serde_json::Value::Null) | None) | Err(_) => {}
            Ok(Some(other)) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}
