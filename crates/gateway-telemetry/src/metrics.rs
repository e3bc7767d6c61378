//! Prometheus metrics for the gateway.
//!
//! All collectors live in a private [`Registry`] owned by [`GatewayMetrics`];
//! nothing is registered globally, so tests can build as many instances as
//! they like.

use prometheus::{
    CounterVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

/// Latency buckets for upstream calls, in seconds
const LLM_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];
/// Latency buckets for HTTP requests, in seconds
const HTTP_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0];

/// Metrics setup error
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A collector could not be created or registered
    #[error("metrics registration failed: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Whether a routed request was served from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the response cache
    Hit,
    /// Served by a provider
    Miss,
}

impl CacheStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Gateway metrics collectors
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    llm_requests: IntCounterVec,
    llm_duration: HistogramVec,
    llm_cost: CounterVec,
    llm_tokens: IntCounterVec,
    provider_errors: IntCounterVec,
    circuit_state: IntGaugeVec,
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

impl GatewayMetrics {
    /// Create and register all collectors
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("gateway_requests_total", "HTTP requests handled by the gateway"),
            &["path", "status", "agent_id"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_BUCKETS.to_vec()),
            &["path", "agent_id"],
        )?;
        let llm_requests = IntCounterVec::new(
            Opts::new("llm_requests_total", "Completions routed, by cache status"),
            &["provider", "model", "agent_id", "cache_status"],
        )?;
        let llm_duration = HistogramVec::new(
            HistogramOpts::new("llm_request_duration_seconds", "Upstream call duration in seconds")
                .buckets(LLM_BUCKETS.to_vec()),
            &["provider", "model"],
        )?;
        let llm_cost = CounterVec::new(
            Opts::new("llm_cost_usd", "Accumulated LLM spend in USD"),
            &["provider", "model"],
        )?;
        let llm_tokens = IntCounterVec::new(
            Opts::new("llm_tokens_total", "Tokens consumed"),
            &["type", "provider", "model"],
        )?;
        let provider_errors = IntCounterVec::new(
            Opts::new("llm_provider_errors_total", "Failed upstream calls"),
            &["provider"],
        )?;
        let circuit_state = IntGaugeVec::new(
            Opts::new(
                "llm_circuit_breaker_state",
                "Circuit state per provider (0 closed, 1 open, 2 half-open)",
            ),
            &["provider"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(llm_requests.clone()))?;
        registry.register(Box::new(llm_duration.clone()))?;
        registry.register(Box::new(llm_cost.clone()))?;
        registry.register(Box::new(llm_tokens.clone()))?;
        registry.register(Box::new(provider_errors.clone()))?;
        registry.register(Box::new(circuit_state.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            llm_requests,
            llm_duration,
            llm_cost,
            llm_tokens,
            provider_errors,
            circuit_state,
        })
    }

    /// Record one HTTP request
    pub fn record_http(&self, path: &str, status: u16, agent_id: &str, duration: Duration) {
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[path, status.as_str(), agent_id])
            .inc();
        self.http_duration
            .with_label_values(&[path, agent_id])
            .observe(duration.as_secs_f64());
    }

    /// Record a routed completion
    pub fn record_llm_request(
        &self,
        provider: &str,
        model: &str,
        agent_id: &str,
        cache: CacheStatus,
    ) {
        self.llm_requests
            .with_label_values(&[provider, model, agent_id, cache.as_str()])
            .inc();
    }

    /// Record a successful upstream call with its usage and cost
    pub fn record_llm_usage(
        &self,
        provider: &str,
        model: &str,
        duration: Duration,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost: f64,
    ) {
        self.llm_duration
            .with_label_values(&[provider, model])
            .observe(duration.as_secs_f64());
        self.llm_tokens
            .with_label_values(&["prompt", provider, model])
            .inc_by(u64::from(prompt_tokens));
        self.llm_tokens
            .with_label_values(&["completion", provider, model])
            .inc_by(u64::from(completion_tokens));
        if cost > 0.0 {
            self.llm_cost.with_label_values(&[provider, model]).inc_by(cost);
        }
    }

    /// Record a failed upstream call
    pub fn record_provider_error(&self, provider: &str) {
        self.provider_errors.with_label_values(&[provider]).inc();
    }

    /// Publish a provider's circuit state (0 closed, 1 open, 2 half-open)
    pub fn set_circuit_state(&self, provider: &str, state: u8) {
        self.circuit_state
            .with_label_values(&[provider])
            .set(i64::from(state));
    }

    /// Encode all metrics in the Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}
