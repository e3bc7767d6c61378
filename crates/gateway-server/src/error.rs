//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde::Serialize;

use crate::middleware::RequestOutcome;

/// Client-facing message for upstream failures; details stay in the logs
pub const UPSTREAM_FAILURE_MESSAGE: &str = "llm failure";

/// Error returned by handlers and middleware
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Message returned in the `error` field
    pub message: String,
    /// Short error kind recorded in the request log
    pub kind: &'static str,
    /// Agent the request was made for, when known
    pub agent_id: Option<String>,
    /// Correlation id
    pub request_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<&'a str>,
}

impl ApiError {
    /// Create an error with an explicit status
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
            agent_id: None,
            request_id: None,
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    /// 401 Unauthorized
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "auth_error", "unauthorized")
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 429 Too Many Requests for an agent
    pub fn rate_limited(agent_id: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "rate limit exceeded",
        )
        .with_agent_id(agent_id)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }

    /// Attach the agent id
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attach the request id
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &err {
            GatewayError::RateLimited { .. } => "rate limit exceeded".to_string(),
            e if status == StatusCode::BAD_GATEWAY => {
                tracing::debug!(error = %e, "Upstream failure");
                UPSTREAM_FAILURE_MESSAGE.to_string()
            }
            GatewayError::Configuration(_) | GatewayError::Internal(_) => {
                "internal error".to_string()
            }
            e => e.to_string(),
        };

        let api = Self::new(status, err.error_type(), message);
        match err {
            GatewayError::RateLimited { agent_id } | GatewayError::ProvidersExhausted { agent_id, .. } => {
                api.with_agent_id(agent_id)
            }
            _ => api,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            request_id: self.request_id.as_deref(),
            // Only rate-limit responses name the agent
            agent_id: (self.status == StatusCode::TOO_MANY_REQUESTS)
                .then_some(self.agent_id.as_deref())
                .flatten(),
        };

        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(RequestOutcome {
            agent_id: self.agent_id.clone(),
            outcome: self.kind,
            deferred: false,
        });
        response
    }
}
