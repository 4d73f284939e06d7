//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`AutoflowError`] via `#[from]`. Step-level failures are not errors of
//! the engine: they are carried as [`ActionError`] values and recorded on
//! the run instead of being propagated.

use std::time::Duration;

/// Top-level error returned by services, ports and the engine.
#[derive(Debug, thiserror::Error)]
pub enum AutoflowError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),

    #[error(transparent)]
    DuplicateRun(#[from] DuplicateRunError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Temporarily unable to accept work, e.g. a full event queue.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Domain invariant violations detected when building or mutating a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("at least one action is required")]
    NoActions,

    #[error("at least one step is required")]
    NoSteps,

    #[error("duplicate step id {0}")]
    DuplicateStepId(String),

    #[error("field `{field}` of {action} must not be empty")]
    EmptyParameter {
        action: &'static str,
        field: &'static str,
    },

    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("events of type `{0}` are produced internally")]
    InternalEventType(String),
}

/// A referenced record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Static authoring mistakes. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no handler registered for action type `{0}`")]
    UnknownActionType(String),

    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    #[error("workflow reference cycle: {}", .0.join(" -> "))]
    CyclicTemplate(Vec<String>),

    #[error("referenced workflow template {0} does not exist")]
    UnknownTemplate(String),

    #[error("conditional workflow must start with a condition step")]
    MissingLeadingCondition,

    #[error("branch references unknown step {0}")]
    UnknownBranchStep(String),

    #[error("invalid schedule `{expression}`: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("trigger type `scheduled` requires a schedule")]
    MissingSchedule,

    #[error("only `scheduled` rules may carry a schedule")]
    UnexpectedSchedule,

    #[error("sub-workflow nesting exceeds depth {0}")]
    DepthExceeded(usize),
}

/// Operation rejected because it would break a relationship between records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityViolation {
    #[error("workflow template {template_id} is referenced by {referrer}")]
    TemplateReferenced {
        template_id: String,
        referrer: String,
    },

    #[error("run {0} is already in a terminal state")]
    RunAlreadyTerminal(String),

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },
}

/// A non-terminal run already exists for the same owner and dedup key.
///
/// Not a failure: callers discard the delivery without side effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("run {existing_run} is already in flight for key `{dedup_key}`")]
pub struct DuplicateRunError {
    pub dedup_key: String,
    pub existing_run: String,
}

/// Outcome of a single failed action attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{message}")]
    Failed { message: String, retryable: bool },

    #[error("timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ActionError {
    /// A failure that may be retried when the handler supplies an
    /// idempotency key.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that must not be retried.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { retryable, .. } => *retryable,
            Self::TimedOut { .. } => true,
            Self::Configuration(_) => false,
        }
    }
}
