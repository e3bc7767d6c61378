//! # Gateway Server
//!
//! HTTP server for the agent gateway.
//!
//! This crate provides:
//! - Axum application with chat, streaming, agent, health and metrics endpoints
//! - Server-sent event relay for streamed completions
//! - Request id, structured request logging, bearer auth and CORS middleware
//! - Graceful shutdown on SIGINT/SIGTERM

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use extractors::{JsonBody, RequestId, REQUEST_ID_HEADER};
pub use middleware::RequestOutcome;
pub use routes::create_router;
pub use server::{shutdown_signal, Server, ServerError};
pub use state::{AppState, AppStateBuilder};
