//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use autoflow_domain::error::{AutoflowError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_run: Option<String>,
}

/// Maps [`AutoflowError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(AutoflowError);

impl From<AutoflowError> for ApiError {
    fn from(err: AutoflowError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// A path or query parameter that does not parse.
    pub fn invalid_id(value: &str) -> Self {
        Self(ValidationError::InvalidId(value.to_string()).into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut existing_run = None;
        let (status, message) = match &self.0 {
            AutoflowError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AutoflowError::Configuration(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AutoflowError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            AutoflowError::Integrity(err) => (StatusCode::CONFLICT, err.to_string()),
            AutoflowError::DuplicateRun(err) => {
                existing_run = Some(err.existing_run.clone());
                (StatusCode::CONFLICT, err.to_string())
            }
            AutoflowError::Unavailable(reason) => {
                (StatusCode::SERVICE_UNAVAILABLE, reason.clone())
            }
            AutoflowError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                existing_run,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_domain::error::{
        ConfigurationError, DuplicateRunError, IntegrityViolation, NotFoundError,
    };

    fn status_of(err: impl Into<AutoflowError>) -> StatusCode {
        ApiError::from(err.into()).into_response().status()
    }

    #[test]
    fn should_map_errors_to_status_codes() {
        assert_eq!(status_of(ValidationError::EmptyName), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ConfigurationError::MissingLeadingCondition),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NotFoundError {
                entity: "AutomationRule",
                id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(IntegrityViolation::RunAlreadyTerminal("r".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DuplicateRunError {
                dedup_key: "k".into(),
                existing_run: "r".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AutoflowError::Storage("disk on fire".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AutoflowError::Unavailable("event queue is full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
