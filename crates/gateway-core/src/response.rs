//! Response and streaming chunk types.

use serde::{Deserialize, Serialize};

/// Completed (non-streaming) response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Model that produced the text
    pub model: String,
    /// Provider that served the request
    pub provider: String,
    /// Token accounting
    pub usage: Usage,
}

impl CompletionResponse {
    /// Create a response
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            usage,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Create usage stats
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One increment of a streamed completion.
///
/// A stream is a sequence of content chunks followed by a single chunk with
/// `done` set. The terminal chunk may carry usage when the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Text delta
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Model producing the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider producing the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Terminal marker
    #[serde(default)]
    pub done: bool,
    /// Final usage, only on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Content chunk
    #[must_use]
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Terminal chunk
    #[must_use]
    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    /// Attach model and provider identifiers
    #[must_use]
    pub fn with_source(mut self, model: impl Into<String>, provider: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self.provider = Some(provider.into());
        self
    }

    /// Attach final usage
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_done_chunk_serializes_compactly() {
        let json = serde_json::to_string(&CompletionChunk::done()).unwrap();
        assert_eq!(json, r#"{"done":true}"#);
    }

    #[test]
    fn test_delta_chunk_fields() {
        let chunk = CompletionChunk::delta("Hel").with_source("m", "p");
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["content"], "Hel");
        assert_eq!(json["provider"], "p");
        assert_eq!(json["done"], false);
    }
}
