//! Action executor — renders an action, dispatches it to its handler, and
//! applies timeouts and bounded retries.

use std::sync::Arc;
use std::time::Duration;

use autoflow_domain::error::{ActionError, ConfigurationError};
use autoflow_domain::rule::{ActionSpec, ActionType};

use crate::handlers::{ActionContext, HandlerRegistry};
use crate::settings::EngineSettings;

/// Result of executing one action, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub result: Result<Option<serde_json::Value>, ActionError>,
    pub attempts: u32,
}

/// Dispatches actions to the injected [`HandlerRegistry`].
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    registry: Arc<HandlerRegistry>,
    settings: Arc<EngineSettings>,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(registry: HandlerRegistry, settings: Arc<EngineSettings>) -> Self {
        Self {
            registry: Arc::new(registry),
            settings,
        }
    }

    /// Execute `action` against `ctx.payload`.
    ///
    /// Unknown action types fail fast with a configuration error. Failed
    /// calls are retried only when the handler is retryable and the error
    /// is transient, up to the configured number of attempts.
    #[tracing::instrument(
        skip(self, action, ctx),
        fields(run_id = %ctx.run_id, step = %ctx.path, action_type = %action.action_type())
    )]
    pub async fn execute(&self, action: &ActionSpec, ctx: &ActionContext) -> ActionOutcome {
        let action_type = action.action_type();
        let Some(handler) = self.registry.get(action_type) else {
            return ActionOutcome {
                result: Err(ConfigurationError::UnknownActionType(action_type.to_string()).into()),
                attempts: 0,
            };
        };

        let rendered = action.render(&ctx.payload);
        if let Err(err) = rendered.validate() {
            return ActionOutcome {
                result: Err(ActionError::permanent(err.to_string())),
                attempts: 0,
            };
        }

        let timeout = self.timeout_for(&rendered);
        let ctx = ActionContext {
            timeout,
            ..ctx.clone()
        };
        let max_attempts = if handler.retryable() {
            self.settings.max_action_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, handler.handle(&rendered, &ctx)).await
            {
                Ok(result) => result,
                Err(_) => Err(ActionError::TimedOut { after: timeout }),
            };
            match result {
                Ok(output) => {
                    return ActionOutcome {
                        result: Ok((!output.is_null()).then_some(output)),
                        attempts: attempt,
                    };
                }
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    tracing::warn!(attempt, error = %err, "action failed, retrying");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "action failed");
                    return ActionOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    fn timeout_for(&self, action: &ActionSpec) -> Duration {
        match action {
            ActionSpec::InvokeAi {
                timeout_secs: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            other => self.settings.timeout_for(other.action_type()),
        }
    }

    /// Whether a handler is registered for `action_type`.
    #[must_use]
    pub fn supports(&self, action_type: ActionType) -> bool {
        self.registry.get(action_type).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoflow_domain::id::RunId;
    use autoflow_domain::run::StepPath;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::handlers::ActionHandler;

    /// Fails the first `failures` calls with the given error.
    struct Flaky {
        calls: Arc<AtomicU32>,
        failures: u32,
        error: ActionError,
        retryable: bool,
    }

    #[async_trait]
    impl ActionHandler for Flaky {
        fn action_type(&self) -> ActionType {
            ActionType::SendEmail
        }

        fn retryable(&self) -> bool {
            self.retryable
        }

        async fn handle(
            &self,
            action: &ActionSpec,
            _ctx: &ActionContext,
        ) -> Result<serde_json::Value, ActionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(self.error.clone());
            }
            let ActionSpec::SendEmail { subject, .. } = action else {
                return Ok(serde_json::Value::Null);
            };
            Ok(serde_json::json!({ "subject": subject }))
        }
    }

    struct Hanging;

    #[async_trait]
    impl ActionHandler for Hanging {
        fn action_type(&self) -> ActionType {
            ActionType::CreateTask
        }

        fn retryable(&self) -> bool {
            false
        }

        async fn handle(
            &self,
            _action: &ActionSpec,
            _ctx: &ActionContext,
        ) -> Result<serde_json::Value, ActionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn settings() -> Arc<EngineSettings> {
        Arc::new(EngineSettings {
            retry_backoff: Duration::from_millis(1),
            default_action_timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        })
    }

    fn flaky(failures: u32, error: ActionError, retryable: bool) -> (ActionExecutor, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = Flaky {
            calls: Arc::clone(&calls),
            failures,
            error,
            retryable,
        };
        let executor = ActionExecutor::new(HandlerRegistry::new().with_handler(handler), settings());
        (executor, calls)
    }

    fn email() -> ActionSpec {
        ActionSpec::SendEmail {
            to: "{{client.email}}".into(),
            subject: "Welcome {{client.name}}".into(),
            body: String::new(),
        }
    }

    fn ctx() -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            path: StepPath::root(0),
            correlation_id: "corr".into(),
            payload: Arc::new(serde_json::json!({
                "client": {"email": "a@b.c", "name": "Acme"}
            })),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn should_render_payload_before_dispatch() {
        let (executor, calls) = flaky(0, ActionError::transient("x"), true);
        let outcome = executor.execute(&email(), &ctx()).await;
        assert_eq!(
            outcome.result,
            Ok(Some(serde_json::json!({"subject": "Welcome Acme"})))
        );
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_retry_transient_failure_when_handler_is_retryable() {
        let (executor, calls) = flaky(2, ActionError::transient("503"), true);
        let outcome = executor.execute(&email(), &ctx()).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_give_up_after_max_attempts() {
        let (executor, calls) = flaky(10, ActionError::transient("503"), true);
        let outcome = executor.execute(&email(), &ctx()).await;
        assert_eq!(outcome.result, Err(ActionError::transient("503")));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_not_retry_permanent_failure() {
        let (executor, calls) = flaky(1, ActionError::permanent("400"), true);
        let outcome = executor.execute(&email(), &ctx()).await;
        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_not_retry_when_handler_is_not_retryable() {
        let (executor, calls) = flaky(1, ActionError::transient("503"), false);
        let outcome = executor.execute(&email(), &ctx()).await;
        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_fail_fast_with_configuration_error_for_unregistered_type() {
        let executor = ActionExecutor::new(HandlerRegistry::new(), settings());
        let outcome = executor.execute(&email(), &ctx()).await;
        assert_eq!(
            outcome.result,
            Err(ActionError::Configuration(
                ConfigurationError::UnknownActionType("send_email".into())
            ))
        );
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn should_fail_when_rendered_parameter_is_blank() {
        let (executor, calls) = flaky(0, ActionError::transient("x"), true);
        let action = ActionSpec::SendEmail {
            to: "{{missing}}".into(),
            subject: "s".into(),
            body: String::new(),
        };
        let outcome = executor.execute(&action, &ctx()).await;
        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_hung_handler() {
        let executor = ActionExecutor::new(HandlerRegistry::new().with_handler(Hanging), settings());
        let action = ActionSpec::CreateTask {
            title: "t".into(),
            description: None,
            assignee: None,
            due_in_days: None,
        };
        let outcome = executor.execute(&action, &ctx()).await;
        assert_eq!(
            outcome.result,
            Err(ActionError::TimedOut {
                after: Duration::from_millis(50)
            })
        );
        assert!(executor.supports(ActionType::CreateTask));
    }
}
