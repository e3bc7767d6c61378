//! # Agent Gateway
//!
//! LLM gateway for multi-agent systems: per-agent rate limits, cost budgets,
//! provider failover behind circuit breakers, and a response cache.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (mock provider on port 8080)
//! agent-gateway
//!
//! # Start with a config file
//! agent-gateway --config /etc/agent-gateway/config.yaml
//!
//! # Environment overrides apply on top of the file
//! GATEWAY_PORT=9000 LLM_PROVIDER=mock agent-gateway
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use gateway_agents::{AgentConfig, AgentRegistry};
use gateway_config::{GatewayConfig, LogFormat};
use gateway_providers::{ProviderFactory, ProviderSettings};
use gateway_resilience::{CircuitBreakerConfig, ResponseCache, ResponseCacheConfig};
use gateway_routing::{ProviderPool, Router, RouterConfig};
use gateway_server::{AppState, Server};
use gateway_telemetry::{init_logging, CostAnalytics, CostTracker, GatewayMetrics, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How often a cost snapshot is taken for projections and alerts
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

/// Agent-aware LLM gateway
#[derive(Parser, Debug)]
#[command(name = "agent-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overriding file and environment
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = ?e, "Gateway failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config =
        GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(
        &LoggingConfig::new()
            .with_level(&config.logging.level)
            .with_json(config.logging.format == LogFormat::Json),
    )
    .context("failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr(),
        provider = %config.providers.primary,
        "Starting agent gateway"
    );

    let registry = Arc::new(build_registry(&config));
    let costs = Arc::new(CostTracker::with_budgets(
        config.budget.daily_usd,
        config.budget.monthly_usd,
    ));
    let analytics = Arc::new(CostAnalytics::new(Arc::clone(&costs)));
    let metrics = GatewayMetrics::new().context("failed to register metrics")?;

    let router = Arc::new(build_router(&config, registry, costs, metrics.clone())?);
    spawn_background_tasks(&config, &router, &analytics);

    let state = AppState::builder()
        .config(config)
        .router(router)
        .analytics(analytics)
        .metrics(metrics)
        .build()?;

    Server::new(state).run().await?;
    Ok(())
}

/// Agent registry with built-in personas and any agents found on disk
fn build_registry(config: &GatewayConfig) -> AgentRegistry {
    let defaults =
        AgentConfig::default().with_rate_limit(config.rate_limit.rps, config.rate_limit.burst);
    let registry = AgentRegistry::with_defaults(defaults);

    if config.agents.load_builtin {
        registry.load_builtin_agents();
    }

    if let Some(dir) = &config.agents.config_dir {
        if let Err(e) = registry.load_from_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to load agent configurations");
        }
    }

    info!(agents = registry.len(), "Agent registry ready");
    registry
}

/// Provider chain from config, wrapped in breakers and ordered for failover
fn build_router(
    config: &GatewayConfig,
    registry: Arc<AgentRegistry>,
    costs: Arc<CostTracker>,
    metrics: GatewayMetrics,
) -> Result<Router> {
    let providers_config = &config.providers;
    let mut settings = ProviderSettings::default();
    if let Some(model) = &providers_config.default_model {
        settings = settings.with_default_model(model);
    }

    let providers = ProviderFactory::with_builtins().build_ordered(
        &providers_config.primary,
        &providers_config.fallbacks,
        &settings,
    );

    let breaker = &config.circuit_breaker;
    let router_config = RouterConfig::new()
        .with_default_provider(&providers_config.primary)
        .with_cache(config.cache.enabled, config.cache.ttl)
        .with_enforce_budget(config.budget.enforce)
        .with_circuit_breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(breaker.failure_threshold)
                .with_reset_timeout(breaker.reset_timeout)
                .with_call_timeout(breaker.call_timeout),
        );

    let cache = ResponseCache::new(
        ResponseCacheConfig::default()
            .with_ttl(config.cache.ttl)
            .with_max_entries(config.cache.max_entries),
    );

    let mut builder = Router::builder(registry)
        .config(router_config)
        .cache(Arc::new(cache))
        .cost_tracker(costs)
        .metrics(metrics);

    for provider in providers {
        let pool = if providers_config.is_local(provider.id()) {
            ProviderPool::Local
        } else {
            ProviderPool::Cloud
        };
        builder = builder.provider_in_pool(provider, pool);
    }

    builder.build().context("failed to build router")
}

/// Periodic cost snapshots and cache sweeps; they run for the process lifetime
fn spawn_background_tasks(
    config: &GatewayConfig,
    router: &Arc<Router>,
    analytics: &Arc<CostAnalytics>,
) {
    let analytics = Arc::clone(analytics);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let snapshot = analytics.record_snapshot();
            debug!(
                daily_spend = snapshot.daily_spend,
                monthly_spend = snapshot.monthly_spend,
                requests = snapshot.request_count,
                "Cost snapshot recorded"
            );
            for alert in analytics.new_alerts() {
                warn!(kind = %alert.kind, percent = alert.percent, "{}", alert.message);
            }
        }
    });

    let every = config.cache.sweep_interval;
    if config.cache.enabled && !every.is_zero() {
        let cache = Arc::clone(router.cache());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Expired cache entries purged");
                }
            }
        });
    }
}
