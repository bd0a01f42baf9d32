//! Error responses.
//!
//! # Responsibilities
//! - Render every failure as `{"status": "error", "error": "..."}`
//! - Map domain errors to HTTP status codes
//!
//! # Design Decisions
//! - Upstream connection failures are 502, upstream timeouts 504
//! - Switch preconditions are client-visible conflicts (412 / 409),
//!   a failed persist is a server error

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::switch::SwitchError;

/// A structured error answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid API key")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<SwitchError> for ApiError {
    fn from(err: SwitchError) -> Self {
        let status = match err {
            SwitchError::TargetUnhealthy { .. } => StatusCode::PRECONDITION_FAILED,
            SwitchError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            SwitchError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::bad_gateway("upstream unavailable").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"status": "error", "error": "upstream unavailable"}));
    }

    #[test]
    fn test_switch_error_status_codes() {
        let unhealthy = ApiError::from(SwitchError::TargetUnhealthy { target: Environment::Green });
        assert_eq!(unhealthy.status(), StatusCode::PRECONDITION_FAILED);
        assert!(unhealthy.message().contains("green"));

        let raced = ApiError::from(SwitchError::ConcurrentModification { expected: Environment::Blue });
        assert_eq!(raced.status(), StatusCode::CONFLICT);
    }
}
