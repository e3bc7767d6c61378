//! # Gateway Telemetry
//!
//! Observability and cost accounting for the agent gateway.
//!
//! This crate provides:
//! - Cost tracking against daily and monthly budgets
//! - Spend history, projections and budget alerts
//! - Prometheus metrics for monitoring
//! - Structured logging

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod cost;
pub mod logging;
pub mod metrics;

// Re-export main types
pub use analytics::{AlertLevel, CostAlert, CostAnalytics, CostPrediction, CostSnapshot};
pub use cost::{CostConfig, CostStatus, CostTracker, ModelPricing, PriceTable, FALLBACK_PRICING};
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{CacheStatus, GatewayMetrics, MetricsError};
