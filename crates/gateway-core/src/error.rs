//! Error types shared across the gateway crates.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors produced while admitting, routing and serving a completion.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The request was malformed or missing required fields
    #[error("{message}")]
    Validation {
        /// Human readable message, returned to the client as-is
        message: String,
    },

    /// Missing or incorrect bearer token
    #[error("unauthorized")]
    Unauthorized,

    /// The agent exhausted its token bucket
    #[error("rate limit exceeded for agent {agent_id}")]
    RateLimited {
        /// Agent whose limiter denied the request
        agent_id: String,
    },

    /// Spend would exceed the configured budget
    #[error("{period} budget exceeded: spent ${spend:.4} of ${budget:.2}")]
    BudgetExceeded {
        /// "daily" or "monthly"
        period: &'static str,
        /// Spend so far in the period
        spend: f64,
        /// Budget for the period
        budget: f64,
    },

    /// The provider's circuit is open; the call was not attempted
    #[error("circuit open for provider {provider}")]
    CircuitOpen {
        /// Provider identifier
        provider: String,
    },

    /// Upstream provider returned an error
    #[error("provider {provider} failed: {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// Error detail from the adapter
        message: String,
    },

    /// Upstream provider did not answer in time
    #[error("provider {provider} timed out after {timeout:?}")]
    Timeout {
        /// Provider identifier
        provider: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Every candidate provider failed or was skipped
    #[error("all providers failed for agent {agent_id} ({attempts} attempted): {last_error}")]
    ProvidersExhausted {
        /// Agent the request was made for
        agent_id: String,
        /// Number of candidates tried
        attempts: usize,
        /// Message of the last failure
        last_error: String,
    },

    /// No providers are registered with the router
    #[error("no providers configured")]
    NoProviders,

    /// An established stream failed mid-flight
    #[error("stream failure: {0}")]
    Stream(String),

    /// Configuration problem detected at runtime
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build an upstream provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a circuit-open error for a provider
    pub fn circuit_breaker_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
        }
    }

    /// Build a timeout error for a provider
    pub fn timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            provider: provider.into(),
            timeout,
        }
    }

    /// Build a rate limit error for an agent
    pub fn rate_limited(agent_id: impl Into<String>) -> Self {
        Self::RateLimited {
            agent_id: agent_id.into(),
        }
    }

    /// HTTP status code this error maps to
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized => 401,
            Self::BudgetExceeded { .. } => 402,
            Self::RateLimited { .. } => 429,
            Self::CircuitOpen { .. }
            | Self::Provider { .. }
            | Self::Timeout { .. }
            | Self::ProvidersExhausted { .. }
            | Self::Stream(_) => 502,
            Self::NoProviders => 503,
            Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable error kind, used as a log and metric label
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unauthorized => "auth_error",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Provider { .. } => "provider_error",
            Self::Timeout { .. } => "timeout",
            Self::ProvidersExhausted { .. } => "providers_exhausted",
            Self::NoProviders => "no_providers",
            Self::Stream(_) => "stream_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the router may move on to the next candidate provider
    #[must_use]
    pub fn is_failover_eligible(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. } | Self::Provider { .. } | Self::Timeout { .. } | Self::Stream(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::validation("bad").status_code(), 400);
        assert_eq!(GatewayError::Unauthorized.status_code(), 401);
        assert_eq!(GatewayError::rate_limited("ada").status_code(), 429);
        assert_eq!(GatewayError::circuit_breaker_open("p").status_code(), 502);
        let exhausted = GatewayError::ProvidersExhausted {
            agent_id: "ada".into(),
            attempts: 2,
            last_error: "boom".into(),
        };
        assert_eq!(exhausted.status_code(), 502);
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = GatewayError::validation("agent_id and messages are required");
        assert_eq!(err.to_string(), "agent_id and messages are required");
    }

    #[test]
    fn test_failover_eligibility() {
        assert!(GatewayError::provider("p", "500").is_failover_eligible());
        assert!(GatewayError::circuit_breaker_open("p").is_failover_eligible());
        assert!(GatewayError::timeout("p", Duration::from_secs(1)).is_failover_eligible());
        assert!(!GatewayError::validation("x").is_failover_eligible());
        assert!(!GatewayError::Unauthorized.is_failover_eligible());
    }
}
