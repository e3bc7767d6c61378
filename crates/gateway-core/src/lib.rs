//! # Gateway Core
//!
//! Core types, traits, and error handling for the agent gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Completion request, response and streaming chunk types
//! - The `Provider` capability trait
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
pub use provider::{ChunkStream, Provider, SharedProvider};
pub use request::{ChatMessage, CompletionRequest, MessageRole, MISSING_FIELDS_MESSAGE};
pub use response::{CompletionChunk, CompletionResponse, Usage};
