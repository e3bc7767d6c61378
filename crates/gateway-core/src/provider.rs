//! Provider capability interface.
//!
//! Every upstream model service, and every decorator wrapped around one
//! (circuit breakers, for instance), implements [`Provider`].

use crate::error::GatewayResult;
use crate::request::CompletionRequest;
use crate::response::{CompletionChunk, CompletionResponse};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Pull-based stream of completion chunks.
///
/// The consumer drives it; dropping it cancels the upstream call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = GatewayResult<CompletionChunk>> + Send>>;

/// Shared, dynamically dispatched provider handle
pub type SharedProvider = Arc<dyn Provider>;

/// Upstream language model provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider identifier
    fn id(&self) -> &str;

    /// Produce a complete response
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse>;

    /// Open a chunk stream. Errors returned here mean no output was produced.
    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<ChunkStream>;
}
