//! HTTP request handlers for the gateway API.

use async_stream::stream;
use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use gateway_core::CompletionRequest;
use gateway_resilience::{CacheStats, CircuitBreakerStats};
use gateway_routing::RouterMetrics;
use gateway_telemetry::{CostAlert, CostPrediction, CostStatus, GatewayMetrics};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::{
    error::ApiError,
    extractors::{JsonBody, RequestId},
    middleware::{log_request, RequestOutcome},
    state::AppState,
};

/// Path recorded for streaming requests
const STREAM_PATH: &str = "/v1/chat/stream";

/// Frame sent when an established stream fails
const STREAM_FAILURE_FRAME: &str = r#"{"error":"stream failure","done":true}"#;

/// Frame sent when upstream ends without a terminal chunk
const DONE_FRAME: &str = r#"{"done":true}"#;

/// Validate the body and take a token from the agent's bucket
fn admit(state: &AppState, request: &CompletionRequest, request_id: &str) -> Result<(), ApiError> {
    request
        .validate()
        .map_err(|e| {
            ApiError::from(e)
                .with_agent_id(&request.agent_id)
                .with_request_id(request_id)
        })?;

    if !state.router.registry().allow(&request.agent_id) {
        warn!(
            request_id = %request_id,
            agent_id = %request.agent_id,
            "Rate limit exceeded"
        );
        return Err(ApiError::rate_limited(&request.agent_id).with_request_id(request_id));
    }
    Ok(())
}

/// `POST /v1/chat`
#[instrument(skip_all, fields(request_id = %request_id, agent_id = %request.agent_id))]
pub async fn chat(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> Result<Response, ApiError> {
    admit(&state, &request, &request_id)?;

    match state.router.complete(&request).await {
        Ok(response) => {
            debug!(provider = %response.provider, model = %response.model, "Completion served");
            let mut http = Json(response).into_response();
            http.extensions_mut()
                .insert(RequestOutcome::ok(&request.agent_id));
            Ok(http)
        }
        Err(err) => {
            error!(error = %err, "Completion failed");
            Err(ApiError::from(err)
                .with_agent_id(&request.agent_id)
                .with_request_id(&request_id))
        }
    }
}

/// Writes the request record for a stream once it ends or is dropped
struct StreamLog {
    metrics: GatewayMetrics,
    request_id: String,
    agent_id: String,
    started: Instant,
    outcome: Option<&'static str>,
}

impl StreamLog {
    fn finish(&mut self, outcome: &'static str) {
        self.outcome = Some(outcome);
    }
}

impl Drop for StreamLog {
    fn drop(&mut self) {
        log_request(
            &self.metrics,
            &self.request_id,
            &self.agent_id,
            STREAM_PATH,
            200,
            self.outcome.unwrap_or("cancelled"),
            self.started.elapsed(),
        );
    }
}

/// `POST /v1/chat/stream`
///
/// Relays chunks as server-sent events. Failover is only possible before the
/// first frame; a failure after that ends the stream with an error frame.
#[instrument(skip_all, fields(request_id = %request_id, agent_id = %request.agent_id))]
pub async fn chat_stream(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    admit(&state, &request, &request_id)?;

    let mut upstream = match state.router.stream(&request).await {
        Ok(upstream) => upstream,
        Err(err) => {
            error!(error = %err, "Stream could not be opened");
            return Err(ApiError::from(err)
                .with_agent_id(&request.agent_id)
                .with_request_id(&request_id));
        }
    };

    let mut log = StreamLog {
        metrics: state.metrics.clone(),
        request_id: request_id.clone(),
        agent_id: request.agent_id.clone(),
        started,
        outcome: None,
    };

    let frames = stream! {
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let done = chunk.done;
                    let data = serde_json::to_string(&chunk).unwrap_or_default();
                    yield Ok::<_, Infallible>(Event::default().data(data));
                    if done {
                        log.finish("ok");
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(request_id = %log.request_id, error = %err, "Stream failed mid-flight");
                    yield Ok(Event::default().data(STREAM_FAILURE_FRAME));
                    log.finish("stream_error");
                    break;
                }
                None => {
                    yield Ok(Event::default().data(DONE_FRAME));
                    log.finish("ok");
                    break;
                }
            }
        }
    };

    let mut response = Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .extensions_mut()
        .insert(RequestOutcome::deferred(&request.agent_id));
    Ok(response)
}

/// One agent in the listing
#[derive(Debug, Serialize)]
pub struct AgentSummary {
    /// Agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider pool
    pub model_tier: String,
    /// Default model, empty when unset
    pub default_model: String,
    /// Sustained request rate
    pub rate_limit_rps: f64,
    /// Bucket capacity
    pub rate_limit_burst: u32,
}

/// `GET /v1/agents`
pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let mut agents: Vec<AgentSummary> = state
        .router
        .registry()
        .configs()
        .iter()
        .map(|cfg| AgentSummary {
            id: cfg.id.clone(),
            name: cfg.name.clone(),
            model_tier: cfg.model_tier.to_string(),
            default_model: cfg.default_model.clone().unwrap_or_default(),
            rate_limit_rps: cfg.rate_limit_rps,
            rate_limit_burst: cfg.rate_limit_burst,
        })
        .collect();
    agents.sort_by(|a, b| a.id.cmp(&b.id));

    Json(json!({ "agents": agents }))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
    /// Default provider
    pub provider: String,
    /// All registered providers, in registration order
    pub providers: Vec<String>,
    /// Registered agents
    pub agent_count: usize,
    /// Gateway version
    pub version: &'static str,
    /// Seconds since start
    pub uptime_seconds: u64,
}

/// `GET /healthz`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let router = &state.router;
    Json(HealthResponse {
        status: "ok",
        provider: router.config().default_provider.clone().unwrap_or_default(),
        providers: router.provider_ids(),
        agent_count: router.registry().len(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// `GET /metrics` (Prometheus text format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}

/// Router counters with cost, breaker and cache detail
#[derive(Debug, Serialize)]
pub struct RouterMetricsResponse {
    /// Call counters
    #[serde(flatten)]
    pub counters: RouterMetrics,
    /// Spend against budgets
    pub cost_status: CostStatus,
    /// Per-provider breaker stats
    pub circuit_breakers: Vec<CircuitBreakerStats>,
    /// Response cache stats
    pub cache: CacheStats,
}

/// `GET /v1/router/metrics`
pub async fn router_metrics(State(state): State<AppState>) -> Json<RouterMetricsResponse> {
    let router = &state.router;
    Json(RouterMetricsResponse {
        counters: router.metrics(),
        cost_status: router.cost_tracker().status(),
        circuit_breakers: router.circuit_stats(),
        cache: router.cache().stats(),
    })
}

/// `POST /v1/router/breakers/:provider/reset`
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<CircuitBreakerStats>, ApiError> {
    if !state.router.reset_breaker(&provider) {
        return Err(ApiError::not_found(format!("unknown provider: {provider}")));
    }
    let stats = state
        .router
        .circuit_stats()
        .into_iter()
        .find(|s| s.provider == provider)
        .ok_or_else(|| ApiError::not_found(format!("unknown provider: {provider}")))?;
    Ok(Json(stats))
}

/// Spend report
#[derive(Debug, Serialize)]
pub struct CostReport {
    /// Current spend against budgets
    pub status: CostStatus,
    /// End-of-month projection
    pub prediction: CostPrediction,
    /// Active budget alerts
    pub alerts: Vec<CostAlert>,
}

/// `GET /v1/cost`
pub async fn cost_report(State(state): State<AppState>) -> Json<CostReport> {
    Json(CostReport {
        status: state.analytics.tracker().status(),
        prediction: state.analytics.predict_monthly(),
        alerts: state.analytics.alerts(),
    })
}
