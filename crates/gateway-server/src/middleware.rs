//! HTTP middleware: request ids, request logging, bearer auth and CORS.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_telemetry::GatewayMetrics;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::{
    error::ApiError,
    extractors::{RequestId, REQUEST_ID_HEADER},
    state::AppState,
};

/// Per-request facts handlers report back to the logging middleware
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Agent the request was made for
    pub agent_id: Option<String>,
    /// `ok` or an error kind
    pub outcome: &'static str,
    /// The response is a stream that logs itself when it ends
    pub deferred: bool,
}

impl RequestOutcome {
    /// Successful request for an agent
    #[must_use]
    pub fn ok(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            outcome: "ok",
            deferred: false,
        }
    }

    /// Streaming request whose record is written by the stream
    #[must_use]
    pub fn deferred(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            outcome: "streaming",
            deferred: true,
        }
    }
}

/// Write the structured record for one request and update HTTP metrics
pub fn log_request(
    metrics: &GatewayMetrics,
    request_id: &str,
    agent_id: &str,
    path: &str,
    status: u16,
    outcome: &str,
    duration: Duration,
) {
    metrics.record_http(path, status, agent_id, duration);
    info!(
        event = "http_request",
        request_id = %request_id,
        agent_id = %agent_id,
        path = %path,
        status,
        outcome = %outcome,
        duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        "Request completed"
    );
}

/// Assign a request id and echo it in the response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());
    let header_value = HeaderValue::from_str(&request_id.0).ok();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Log every request and record its HTTP metrics.
///
/// Streaming responses are logged by the stream when it finishes or is
/// cancelled.
pub async fn logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    let outcome = response.extensions().get::<RequestOutcome>().cloned();
    if outcome.as_ref().is_some_and(|o| o.deferred) {
        return response;
    }

    let status = response.status();
    let (agent_id, outcome) = match &outcome {
        Some(o) => (o.agent_id.as_deref().unwrap_or_default(), o.outcome),
        None if status.is_success() => ("", "ok"),
        None => ("", "error"),
    };

    log_request(
        &state.metrics,
        &request_id,
        agent_id,
        &path,
        status.as_u16(),
        outcome,
        started.elapsed(),
    );
    response
}

/// Require `Authorization: Bearer <token>` when a token is configured
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.server.auth_token() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()));

    if authorized {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    warn!(path = %path, "Authentication failed");
    let mut error = ApiError::unauthorized();
    if let Some(id) = request.extensions().get::<RequestId>() {
        error = error.with_request_id(&id.0);
    }
    error.into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// CORS restricted to an explicit origin allow-list
#[must_use]
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)])
}
