//! Gateway configuration model.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use validator::Validate;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    #[validate(nested)]
    pub server: ServerConfig,

    /// Provider selection
    #[validate(nested)]
    pub providers: ProvidersConfig,

    /// Spend budgets
    #[validate(nested)]
    pub budget: BudgetConfig,

    /// Per-provider circuit breaker
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Default per-agent rate limit
    #[validate(nested)]
    pub rate_limit: RateLimitSettings,

    /// Response cache
    #[validate(nested)]
    pub cache: CacheSettings,

    /// Agent registry sources
    pub agents: AgentsConfig,

    /// Log output
    #[validate(nested)]
    pub logging: LogSettings,
}

impl GatewayConfig {
    /// Load configuration: defaults, then the optional file, then the
    /// process environment, then validation.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or the merged
    /// configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML or TOML file, chosen by extension
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?
            }
            Some("toml") => toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Check field ranges and cross-field constraints
    ///
    /// # Errors
    /// Returns the first set of violations found
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| ConfigError::invalid(e.to_string()))?;

        if self.providers.primary.trim().is_empty() {
            return Err(ConfigError::invalid("providers.primary must not be empty"));
        }
        if self.circuit_breaker.reset_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "circuit_breaker.reset_timeout must be greater than zero",
            ));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(ConfigError::invalid(
                "cache.ttl must be greater than zero when the cache is enabled",
            ));
        }
        if self.budget.monthly_usd > 0.0 && self.budget.daily_usd > self.budget.monthly_usd {
            return Err(ConfigError::invalid(
                "budget.daily_usd must not exceed budget.monthly_usd",
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    #[validate(range(min = 1))]
    pub port: u16,

    /// Bearer token; authentication is off when unset
    pub auth_token: Option<String>,

    /// Origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,

    /// Time allowed to receive a request
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Time allowed to produce a non-streaming response
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Keep-alive idle time
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Time allowed for in-flight requests at shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_token: None,
            cors_allowed_origins: default_cors_origins(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured token, ignoring blanks
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|t| !t.is_empty())
    }
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

/// Provider selection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider tried first
    pub primary: String,

    /// Providers tried after the primary, in order
    pub fallbacks: Vec<String>,

    /// Model used when neither request nor agent names one
    pub default_model: Option<String>,

    /// Providers placed in the local pool; all others are cloud
    pub local: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: "mock".to_string(),
            fallbacks: Vec::new(),
            default_model: None,
            local: Vec::new(),
        }
    }
}

impl ProvidersConfig {
    /// Whether a provider belongs to the local pool
    #[must_use]
    pub fn is_local(&self, provider: &str) -> bool {
        self.local.iter().any(|p| p == provider)
    }
}

/// Spend budgets
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily budget in USD; zero disables the daily limit
    #[validate(range(min = 0.0))]
    pub daily_usd: f64,

    /// Monthly budget in USD; zero disables the monthly limit
    #[validate(range(min = 0.0))]
    pub monthly_usd: f64,

    /// Reject requests once a budget is spent
    pub enforce: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_usd: 50.0,
            monthly_usd: 500.0,
            enforce: false,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Cooldown before a half-open trial
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Upper bound on a single provider call; unset disables it
    #[serde(with = "humantime_serde")]
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Default rate limit for agents without their own
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Sustained requests per second
    #[validate(range(exclusive_min = 0.0))]
    pub rps: f64,

    /// Bucket capacity
    #[validate(range(min = 1))]
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { rps: 5.0, burst: 10 }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    /// Serve repeated requests from cache
    pub enabled: bool,

    /// Entry lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Capacity before eviction
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// Interval between expired-entry sweeps
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Agent registry sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Register the built-in personas
    pub load_builtin: bool,

    /// Directory of agent JSON files
    pub config_dir: Option<PathBuf>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            load_builtin: true,
            config_dir: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines
    #[default]
    Json,
    /// Human-readable
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Log settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive
    #[validate(length(min = 1))]
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers.primary, "mock");
        assert!((config.budget.daily_usd - 50.0).abs() < f64::EPSILON);
        assert!((config.budget.monthly_usd - 500.0).abs() < f64::EPSILON);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.rate_limit.burst, 10);
        assert_eq!(config.server.cors_allowed_origins.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file() {
        let file = write_file(
            ".yaml",
            r"
server:
  port: 9000
  auth_token: secret
providers:
  primary: mock
  fallbacks: [backup]
circuit_breaker:
  failure_threshold: 5
  reset_timeout: 30s
cache:
  ttl: 2m
",
        );
        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.auth_token(), Some("secret"));
        assert_eq!(config.providers.fallbacks, vec!["backup"]);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        // Untouched sections keep their defaults
        assert!((config.budget.daily_usd - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_toml_file() {
        let file = write_file(
            ".toml",
            r#"
[budget]
daily_usd = 5.0
monthly_usd = 100.0
enforce = true

[logging]
level = "debug"
format = "pretty"
"#,
        );
        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert!(config.budget.enforce);
        assert!((config.budget.daily_usd - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_file(".ini", "port=1");
        let err = GatewayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_file(".yaml", "server: [not, a, map");
        let err = GatewayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::from_file(Path::new("/nonexistent/gateway.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rate_limit.rps = 0.0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.budget.daily_usd = 600.0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.providers.primary = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_auth_token_disables_auth() {
        let mut config = ServerConfig::default();
        config.auth_token = Some(String::new());
        assert_eq!(config.auth_token(), None);
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
