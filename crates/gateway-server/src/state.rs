//! Shared application state.

use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, GatewayResult};
use gateway_routing::Router;
use gateway_telemetry::{CostAnalytics, GatewayMetrics};
use std::sync::Arc;
use std::time::Instant;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Provider router; owns the agent registry, cache and cost tracker
    pub router: Arc<Router>,
    /// Spend history, projections and alerts
    pub analytics: Arc<CostAnalytics>,
    /// Prometheus metrics
    pub metrics: GatewayMetrics,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Seconds since the state was built
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.router.provider_ids())
            .field("agents", &self.router.registry().len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    router: Option<Arc<Router>>,
    analytics: Option<Arc<CostAnalytics>>,
    metrics: Option<GatewayMetrics>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the router
    #[must_use]
    pub fn router(mut self, router: Arc<Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Set the cost analytics; defaults to one over the router's tracker
    #[must_use]
    pub fn analytics(mut self, analytics: Arc<CostAnalytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Set the metrics registry; should be the one the router records into
    #[must_use]
    pub fn metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state
    pub fn build(self) -> GatewayResult<AppState> {
        let router = self
            .router
            .ok_or_else(|| GatewayError::Configuration("router is required".to_string()))?;

        let analytics = self
            .analytics
            .unwrap_or_else(|| Arc::new(CostAnalytics::new(Arc::clone(router.cost_tracker()))));

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => GatewayMetrics::new()
                .map_err(|e| GatewayError::Configuration(format!("metrics: {e}")))?,
        };

        Ok(AppState {
            config: Arc::new(self.config.unwrap_or_default()),
            router,
            analytics,
            metrics,
            started_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_agents::AgentRegistry;
    use gateway_providers::MockProvider;

    #[test]
    fn test_router_is_required() {
        let err = AppState::builder().build().unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn test_analytics_share_router_tracker() {
        let router = Router::builder(Arc::new(AgentRegistry::new()))
            .provider(Arc::new(MockProvider::default()))
            .build()
            .unwrap();
        let state = AppState::builder().router(Arc::new(router)).build().unwrap();
        assert!(Arc::ptr_eq(
            state.analytics.tracker(),
            state.router.cost_tracker()
        ));
        assert_eq!(state.config.server.port, 8080);
    }
}
