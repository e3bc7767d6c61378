//! # Gateway Resilience
//!
//! Resilience patterns for the agent gateway:
//! - Circuit breaker decorating each provider, with per-call timeouts
//! - TTL response cache keyed by request fingerprint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit_breaker;

// Re-export main types
pub use cache::{request_fingerprint, CacheStats, ResponseCache, ResponseCacheConfig};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
