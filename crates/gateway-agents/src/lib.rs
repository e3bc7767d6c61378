//! # Gateway Agents
//!
//! Agent configuration and per-agent admission control for the gateway.
//!
//! This crate provides:
//! - [`AgentConfig`] and [`ModelTier`]: what an agent is allowed to use
//! - [`AgentRegistry`]: configuration lookup with documented defaults,
//!   directory loading and the built-in persona set
//! - [`TokenBucket`]: non-blocking per-agent rate limiting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod registry;

// Re-export main types
pub use config::{
    AgentConfig, ModelTier, DEFAULT_COMPLEXITY_THRESHOLD, DEFAULT_MAX_TOKENS,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS, DEFAULT_TEMPERATURE,
};
pub use error::RegistryError;
pub use rate_limit::TokenBucket;
pub use registry::AgentRegistry;
