//! # Gateway Routing
//!
//! Agent-aware routing for the agent gateway.
//!
//! This crate provides:
//! - Agent default resolution (model, sampling parameters)
//! - Response cache short-circuiting
//! - Ordered provider failover through per-provider circuit breakers
//! - Model tier pools for local and cloud providers, chosen by task
//!   complexity for hybrid agents
//! - Provider preference from the model name
//! - Router counters

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod router;
pub mod selection;

// Re-export main types
pub use router::{ProviderPool, Router, RouterBuilder, RouterConfig, RouterMetrics};
pub use selection::{assess_complexity, model_affinity};
