//! Agent-aware completion router.
//!
//! The router resolves an agent's configuration, consults the response cache,
//! and walks an ordered list of candidate providers, each wrapped in its own
//! circuit breaker, until one answers.

use async_stream::stream;
use futures::StreamExt;
use gateway_agents::{AgentConfig, AgentRegistry, ModelTier};
use gateway_core::{
    ChunkStream, CompletionRequest, CompletionResponse, GatewayError, GatewayResult,
    Provider, SharedProvider, Usage,
};
use gateway_resilience::{
    request_fingerprint, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, ResponseCache,
    ResponseCacheConfig,
};
use gateway_telemetry::{CacheStatus, CostTracker, GatewayMetrics};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::selection::{assess_complexity, model_affinity};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Provider tried first within its pool when the model names no provider;
    /// defaults to the first registered
    pub default_provider: Option<String>,
    /// Serve repeated requests from the response cache
    pub cache_enabled: bool,
    /// Lifetime of cached responses
    pub cache_ttl: Duration,
    /// Reject requests once a budget is spent
    pub enforce_budget: bool,
    /// Breaker settings applied to every provider
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            enforce_budget: false,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Create a new router configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default provider
    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Enable or disable caching
    #[must_use]
    pub fn with_cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl = ttl;
        self
    }

    /// Enable budget enforcement
    #[must_use]
    pub fn with_enforce_budget(mut self, enforce: bool) -> Self {
        self.enforce_budget = enforce;
        self
    }

    /// Set breaker settings
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }
}

/// Provider pool used for model tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPool {
    /// Locally hosted small models
    Local,
    /// Hosted large models
    Cloud,
}

/// Snapshot of router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterMetrics {
    /// Requests routed, including cache hits and exhaustions
    pub total_calls: u64,
    /// Requests answered by a provider
    pub cloud_hits: u64,
    /// Requests answered from cache
    pub cache_hits: u64,
    /// Moves to a later candidate after a failure
    pub failovers: u64,
    /// Provider calls that failed (open circuits excluded)
    pub provider_errors: u64,
    /// Requests for which every candidate failed
    pub failed_calls: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: AtomicU64,
    cloud_hits: AtomicU64,
    cache_hits: AtomicU64,
    failovers: AtomicU64,
    provider_errors: AtomicU64,
    failed_calls: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RouterMetrics {
        RouterMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            cloud_hits: self.cloud_hits.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct Route {
    breaker: Arc<CircuitBreaker>,
    pool: ProviderPool,
}

/// Shared recording sinks, cloned into streams that outlive a `&Router`
#[derive(Debug, Clone)]
struct Recorder {
    costs: Arc<CostTracker>,
    metrics: Option<GatewayMetrics>,
    counters: Arc<Counters>,
}

impl Recorder {
    fn success(&self, agent_id: &str, provider: &str, model: &str, usage: &Usage, elapsed: Duration) {
        let cost = self.costs.record_usage(provider, model, usage);
        if let Some(metrics) = &self.metrics {
            metrics.record_llm_request(provider, model, agent_id, CacheStatus::Miss);
            metrics.record_llm_usage(
                provider,
                model,
                elapsed,
                usage.prompt_tokens,
                usage.completion_tokens,
                cost,
            );
        }
    }

    fn failure(&self, breaker: &CircuitBreaker, error: &GatewayError) {
        if !matches!(error, GatewayError::CircuitOpen { .. }) {
            Counters::bump(&self.counters.provider_errors);
            if let Some(metrics) = &self.metrics {
                metrics.record_provider_error(breaker.provider_id());
            }
        }
        self.publish_state(breaker);
    }

    fn publish_state(&self, breaker: &CircuitBreaker) {
        if let Some(metrics) = &self.metrics {
            metrics.set_circuit_state(breaker.provider_id(), breaker.state() as u8);
        }
    }
}

/// Builder for [`Router`]
pub struct RouterBuilder {
    registry: Arc<AgentRegistry>,
    providers: Vec<(SharedProvider, ProviderPool)>,
    config: RouterConfig,
    cache: Option<Arc<ResponseCache>>,
    costs: Option<Arc<CostTracker>>,
    metrics: Option<GatewayMetrics>,
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("providers", &self.providers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    /// Register a cloud provider
    #[must_use]
    pub fn provider(self, provider: SharedProvider) -> Self {
        self.provider_in_pool(provider, ProviderPool::Cloud)
    }

    /// Register a provider in a specific pool
    #[must_use]
    pub fn provider_in_pool(mut self, provider: SharedProvider, pool: ProviderPool) -> Self {
        self.providers.push((provider, pool));
        self
    }

    /// Set the router configuration
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a shared response cache
    #[must_use]
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a shared cost tracker
    #[must_use]
    pub fn cost_tracker(mut self, costs: Arc<CostTracker>) -> Self {
        self.costs = Some(costs);
        self
    }

    /// Record Prometheus metrics
    #[must_use]
    pub fn metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the router
    ///
    /// # Errors
    /// Returns `NoProviders` if no provider was registered
    pub fn build(self) -> GatewayResult<Router> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(self.providers.len());
        for (provider, pool) in self.providers {
            if !seen.insert(provider.id().to_string()) {
                warn!(provider = %provider.id(), "Duplicate provider ignored");
                continue;
            }
            routes.push(Route {
                breaker: Arc::new(CircuitBreaker::new(
                    provider,
                    self.config.circuit_breaker.clone(),
                )),
                pool,
            });
        }

        if routes.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let mut config = self.config;
        match &config.default_provider {
            Some(id) if !seen.contains(id) => {
                warn!(provider = %id, "Default provider is not registered; using first provider");
                config.default_provider = None;
            }
            _ => {}
        }
        if config.default_provider.is_none() {
            config.default_provider = routes.first().map(|r| r.breaker.provider_id().to_string());
        }

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(ResponseCache::new(
                ResponseCacheConfig::default().with_ttl(config.cache_ttl),
            ))
        });

        let recorder = Recorder {
            costs: self.costs.unwrap_or_default(),
            metrics: self.metrics,
            counters: Arc::new(Counters::default()),
        };
        for route in &routes {
            recorder.publish_state(&route.breaker);
        }

        info!(
            providers = routes.len(),
            default_provider = ?config.default_provider,
            cache_enabled = config.cache_enabled,
            enforce_budget = config.enforce_budget,
            "Router initialized"
        );

        Ok(Router {
            registry: self.registry,
            routes,
            config,
            cache,
            recorder,
        })
    }
}

/// Routes completions for agents across providers
#[derive(Debug)]
pub struct Router {
    registry: Arc<AgentRegistry>,
    routes: Vec<Route>,
    config: RouterConfig,
    cache: Arc<ResponseCache>,
    recorder: Recorder,
}

impl Router {
    /// Start building a router over an agent registry
    #[must_use]
    pub fn builder(registry: Arc<AgentRegistry>) -> RouterBuilder {
        RouterBuilder {
            registry,
            providers: Vec::new(),
            config: RouterConfig::default(),
            cache: None,
            costs: None,
            metrics: None,
        }
    }

    /// Get the agent registry
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Get the response cache
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Get the cost tracker
    #[must_use]
    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.recorder.costs
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Registered provider ids in registration order
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| r.breaker.provider_id().to_string())
            .collect()
    }

    /// Breaker guarding a provider
    #[must_use]
    pub fn breaker(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.routes
            .iter()
            .find(|r| r.breaker.provider_id() == provider)
            .map(|r| Arc::clone(&r.breaker))
    }

    /// Close a provider's circuit; returns false for unknown providers
    pub fn reset_breaker(&self, provider: &str) -> bool {
        self.breaker(provider).is_some_and(|b| {
            b.reset();
            self.recorder.publish_state(&b);
            true
        })
    }

    /// Per-provider breaker statistics
    #[must_use]
    pub fn circuit_stats(&self) -> Vec<CircuitBreakerStats> {
        self.routes.iter().map(|r| r.breaker.stats()).collect()
    }

    /// Snapshot of the router counters
    #[must_use]
    pub fn metrics(&self) -> RouterMetrics {
        self.recorder.counters.snapshot()
    }

    /// Route a completion.
    ///
    /// # Errors
    /// Returns `BudgetExceeded` when enforcement is on and a budget is spent,
    /// or `ProvidersExhausted` when every candidate failed
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    pub async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let counters = &self.recorder.counters;
        let (agent, request) = self.resolve(request);

        let key = self.config.cache_enabled.then(|| request_fingerprint(&request));
        if let Some(hit) = key.as_deref().and_then(|k| self.cache.get(k)) {
            Counters::bump(&counters.cache_hits);
            Counters::bump(&counters.total_calls);
            if let Some(metrics) = &self.recorder.metrics {
                metrics.record_llm_request(&hit.provider, &hit.model, &agent.id, CacheStatus::Hit);
            }
            debug!(provider = %hit.provider, "Served from cache");
            return Ok(hit);
        }

        self.admit_budget()?;

        let candidates = self.candidates(&agent, &request);
        let mut last_error = None;
        for (attempt, breaker) in candidates.iter().enumerate() {
            if attempt > 0 {
                Counters::bump(&counters.failovers);
            }
            let started = Instant::now();
            match breaker.complete(&request).await {
                Ok(response) => {
                    self.recorder.success(
                        &agent.id,
                        &response.provider,
                        &response.model,
                        &response.usage,
                        started.elapsed(),
                    );
                    self.recorder.publish_state(breaker);
                    if let Some(key) = key {
                        self.cache.put(key, response.clone(), self.config.cache_ttl);
                    }
                    Counters::bump(&counters.cloud_hits);
                    Counters::bump(&counters.total_calls);
                    debug!(provider = %breaker.provider_id(), attempt, "Completion served");
                    return Ok(response);
                }
                Err(err) => {
                    warn!(provider = %breaker.provider_id(), error = %err, "Provider attempt failed");
                    self.recorder.failure(breaker, &err);
                    if !err.is_failover_eligible() {
                        Counters::bump(&counters.total_calls);
                        Counters::bump(&counters.failed_calls);
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(self.exhausted(&agent.id, candidates.len(), last_error))
    }

    /// Route a streaming completion.
    ///
    /// Failover happens only while opening the stream. Once a provider has
    /// produced a stream, its errors are forwarded and never retried.
    ///
    /// # Errors
    /// Same as [`Router::complete`]
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    pub async fn stream(&self, request: &CompletionRequest) -> GatewayResult<ChunkStream> {
        let counters = &self.recorder.counters;
        let (agent, request) = self.resolve(request);
        self.admit_budget()?;

        let candidates = self.candidates(&agent, &request);
        let mut last_error = None;
        for (attempt, breaker) in candidates.iter().enumerate() {
            if attempt > 0 {
                Counters::bump(&counters.failovers);
            }
            match breaker.stream(&request).await {
                Ok(upstream) => {
                    Counters::bump(&counters.cloud_hits);
                    Counters::bump(&counters.total_calls);
                    debug!(provider = %breaker.provider_id(), attempt, "Stream opened");
                    return Ok(self.observe_stream(upstream, Arc::clone(breaker), &agent, &request));
                }
                Err(err) => {
                    warn!(provider = %breaker.provider_id(), error = %err, "Stream attempt failed");
                    self.recorder.failure(breaker, &err);
                    if !err.is_failover_eligible() {
                        Counters::bump(&counters.total_calls);
                        Counters::bump(&counters.failed_calls);
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(self.exhausted(&agent.id, candidates.len(), last_error))
    }

    /// Fill unset request fields from the agent's configuration
    fn resolve(&self, request: &CompletionRequest) -> (AgentConfig, CompletionRequest) {
        let agent = self.registry.get(&request.agent_id);
        let mut resolved = request.clone();
        if resolved.model.as_deref().map_or(true, str::is_empty) {
            resolved.model.clone_from(&agent.default_model);
        }
        resolved.temperature.get_or_insert(agent.temperature);
        resolved.max_tokens.get_or_insert(agent.max_tokens);
        (agent, resolved)
    }

    fn admit_budget(&self) -> GatewayResult<()> {
        if self.config.enforce_budget {
            self.recorder.costs.check_budget(0.0)?;
        }
        Ok(())
    }

    /// Pools to draw from, in order, for an agent's tier
    fn pool_order(agent: &AgentConfig, request: &CompletionRequest) -> &'static [ProviderPool] {
        match agent.model_tier {
            ModelTier::LocalSlm => &[ProviderPool::Local],
            ModelTier::CloudLlm => &[ProviderPool::Cloud],
            ModelTier::Hybrid => {
                let complexity = assess_complexity(request);
                let cloud_first = complexity >= agent.complexity_threshold;
                debug!(
                    complexity,
                    threshold = agent.complexity_threshold,
                    cloud_first,
                    "Hybrid pool choice"
                );
                if cloud_first {
                    &[ProviderPool::Cloud, ProviderPool::Local]
                } else {
                    &[ProviderPool::Local, ProviderPool::Cloud]
                }
            }
        }
    }

    /// Candidate order, pool by pool: providers the model name points at,
    /// then the default provider, then the rest in registration order.
    /// A tier whose pools are empty falls back to every provider.
    fn candidates(
        &self,
        agent: &AgentConfig,
        request: &CompletionRequest,
    ) -> Vec<Arc<CircuitBreaker>> {
        let affinity = model_affinity(request.model_or_empty());
        let default_provider = self.config.default_provider.as_deref();

        let rank = |route: &Route| -> usize {
            let id = route.breaker.provider_id();
            affinity
                .iter()
                .position(|p| *p == id)
                .or_else(|| (default_provider == Some(id)).then_some(affinity.len()))
                .unwrap_or(affinity.len() + 1)
        };
        let pools = Self::pool_order(agent, request);
        let mut ordered: Vec<(usize, usize, &Route)> = self
            .routes
            .iter()
            .filter_map(|r| {
                let pool = pools.iter().position(|p| *p == r.pool)?;
                Some((pool, rank(r), r))
            })
            .collect();
        if ordered.is_empty() {
            ordered = self.routes.iter().map(|r| (0, rank(r), r)).collect();
        }

        // Stable: ties keep registration order
        ordered.sort_by_key(|&(pool, score, _)| (pool, score));
        ordered
            .into_iter()
            .map(|(_, _, route)| Arc::clone(&route.breaker))
            .collect()
    }

    fn exhausted(
        &self,
        agent_id: &str,
        attempts: usize,
        last_error: Option<GatewayError>,
    ) -> GatewayError {
        let counters = &self.recorder.counters;
        Counters::bump(&counters.total_calls);
        Counters::bump(&counters.failed_calls);
        warn!(agent_id = %agent_id, attempts, "All providers failed");
        GatewayError::ProvidersExhausted {
            agent_id: agent_id.to_string(),
            attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        }
    }

    /// Record cost from the terminal chunk's usage and errors as they pass
    fn observe_stream(
        &self,
        mut upstream: ChunkStream,
        breaker: Arc<CircuitBreaker>,
        agent: &AgentConfig,
        request: &CompletionRequest,
    ) -> ChunkStream {
        let recorder = self.recorder.clone();
        let agent_id = agent.id.clone();
        let requested_model = request.model_or_empty().to_string();
        let started = Instant::now();

        Box::pin(stream! {
            while let Some(item) = upstream.next().await {
                match &item {
                    Ok(chunk) if chunk.done => {
                        let model = chunk.model.clone().unwrap_or_else(|| requested_model.clone());
                        let usage = chunk.usage.unwrap_or_default();
                        recorder.success(&agent_id, breaker.provider_id(), &model, &usage, started.elapsed());
                        recorder.publish_state(&breaker);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(provider = %breaker.provider_id(), error = %err, "Stream failed mid-flight");
                        recorder.failure(&breaker, err);
                    }
                }
                let terminal = !matches!(&item, Ok(chunk) if !chunk.done);
                yield item;
                if terminal {
                    break;
                }
            }
        })
    }
}
