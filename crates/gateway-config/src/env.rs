//! Environment variable overrides.
//!
//! Every override is optional. Values that fail to parse are logged and
//! ignored, leaving the current value in place.

use crate::config::{GatewayConfig, LogFormat};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.string(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, value = %raw, error = %e, "Ignoring invalid environment value");
                None
            }
        }
    }

    fn millis(&self, key: &str) -> Option<Duration> {
        self.parsed::<u64>(key).map(Duration::from_millis)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = self.string(key)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!(key = %key, value = %raw, "Ignoring invalid boolean environment value");
                None
            }
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.string(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }
}

impl GatewayConfig {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides { lookup };

        let server = &mut self.server;
        if let Some(v) = env.string("GATEWAY_HOST") {
            server.host = v;
        }
        if let Some(v) = env.parsed("GATEWAY_PORT") {
            server.port = v;
        }
        if let Some(v) = env.string("GATEWAY_AUTH_TOKEN") {
            server.auth_token = Some(v);
        }
        if let Some(v) = env.list("CORS_ALLOWED_ORIGINS") {
            server.cors_allowed_origins = v;
        }
        if let Some(v) = env.millis("HTTP_READ_TIMEOUT_MS") {
            server.read_timeout = v;
        }
        if let Some(v) = env.millis("HTTP_WRITE_TIMEOUT_MS") {
            server.write_timeout = v;
        }
        if let Some(v) = env.millis("HTTP_IDLE_TIMEOUT_MS") {
            server.idle_timeout = v;
        }

        let providers = &mut self.providers;
        if let Some(v) = env.string("LLM_PROVIDER") {
            providers.primary = v;
        }
        if let Some(v) = env.list("LLM_FALLBACKS") {
            providers.fallbacks = v;
        }
        if let Some(v) = env.string("LLM_DEFAULT_MODEL") {
            providers.default_model = Some(v);
        }

        if let Some(v) = env.parsed("GATEWAY_RATE_RPS") {
            self.rate_limit.rps = v;
        }
        if let Some(v) = env.parsed("GATEWAY_RATE_BURST") {
            self.rate_limit.burst = v;
        }

        if let Some(v) = env.parsed("LLM_DAILY_BUDGET_USD") {
            self.budget.daily_usd = v;
        }
        if let Some(v) = env.parsed("LLM_MONTHLY_BUDGET_USD") {
            self.budget.monthly_usd = v;
        }
        if let Some(v) = env.flag("LLM_ENFORCE_BUDGET") {
            self.budget.enforce = v;
        }

        if let Some(v) = env.parsed("CIRCUIT_FAILURE_THRESHOLD") {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = env.millis("CIRCUIT_RESET_TIME_MS") {
            self.circuit_breaker.reset_timeout = v;
        }
        if let Some(v) = env.millis("PROVIDER_TIMEOUT_MS") {
            self.circuit_breaker.call_timeout = (!v.is_zero()).then_some(v);
        }

        if let Some(v) = env.flag("CACHE_ENABLED") {
            self.cache.enabled = v;
        }
        if let Some(v) = env.millis("CACHE_TTL_MS") {
            self.cache.ttl = v;
        }

        if let Some(v) = env.string("AGENT_CONFIG_DIR") {
            self.agents.config_dir = Some(PathBuf::from(v));
        }

        if let Some(v) = env.string("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env.parsed::<LogFormat>("LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
