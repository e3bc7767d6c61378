//! Echo provider for local development and tests.
//!
//! Replies with the request's message contents prefixed by `[mock] `. Token
//! counts are estimated at four characters per token.

use async_stream::try_stream;
use async_trait::async_trait;
use gateway_core::{
    ChunkStream, CompletionChunk, CompletionRequest, CompletionResponse, GatewayResult, Provider,
    Usage,
};
use std::time::Duration;
use tracing::debug;

/// Default identifier of the mock provider
pub const MOCK_PROVIDER_ID: &str = "mock";

const DEFAULT_MOCK_MODEL: &str = "mock-model";

/// Provider that echoes its input
#[derive(Debug, Clone)]
pub struct MockProvider {
    id: String,
    default_model: String,
    latency: Option<Duration>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MOCK_PROVIDER_ID)
    }
}

impl MockProvider {
    /// Create a mock provider with the given id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_model: DEFAULT_MOCK_MODEL.to_string(),
            latency: None,
        }
    }

    /// Model reported when the request names none
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Simulated upstream latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn model_for(&self, request: &CompletionRequest) -> String {
        request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn reply(request: &CompletionRequest) -> (String, Usage) {
        let prompt = request.joined_content("\n");
        let content = format!("[mock] {prompt}");
        let usage = Usage::new(estimate_tokens(&prompt), estimate_tokens(&content));
        (content, usage)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        self.simulate_latency().await;
        let (content, usage) = Self::reply(request);
        debug!(provider = %self.id, agent_id = %request.agent_id, "Mock completion");
        Ok(CompletionResponse::new(content, self.model_for(request), &self.id, usage))
    }

    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<ChunkStream> {
        self.simulate_latency().await;
        let (content, usage) = Self::reply(request);
        let model = self.model_for(request);
        let provider = self.id.clone();

        let stream = try_stream! {
            for piece in content.split_inclusive(' ') {
                yield CompletionChunk::delta(piece).with_source(&model, &provider);
            }
            yield CompletionChunk::done().with_usage(usage);
        };
        Ok(Box::pin(stream))
    }
}
