//! # Gateway Config
//!
//! Configuration management for the agent gateway.
//!
//! Configuration is assembled in layers:
//! - Built-in defaults
//! - An optional YAML or TOML file
//! - Environment variable overrides
//!
//! and validated once the layers are merged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;

// Re-export main types
pub use config::{
    AgentsConfig, BudgetConfig, CacheSettings, CircuitBreakerSettings, GatewayConfig, LogFormat,
    LogSettings, ProvidersConfig, RateLimitSettings, ServerConfig,
};
pub use error::{ConfigError, Result};
