//! Request types for the gateway.
//!
//! A [`CompletionRequest`] is what a client posts on behalf of an agent. Model,
//! temperature and token limit are optional; the router fills them from the
//! agent's configuration before a provider sees the request.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Message returned when the two mandatory fields are missing
pub const MISSING_FIELDS_MESSAGE: &str = "agent_id and messages are required";

/// Completion request issued on behalf of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Agent the request is made for
    #[serde(default)]
    pub agent_id: String,

    /// Ordered conversation
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Model override; falls back to the agent's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a request for an agent with the given messages
    #[must_use]
    pub fn new(agent_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            agent_id: agent_id.into(),
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Check the fields a client must supply.
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` when `agent_id` or `messages` is
    /// empty, or when an explicit temperature is outside 0.0..=2.0.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.agent_id.trim().is_empty() || self.messages.is_empty() {
            return Err(GatewayError::validation(MISSING_FIELDS_MESSAGE));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(GatewayError::validation(
                    "temperature must be between 0.0 and 2.0",
                ));
            }
        }
        Ok(())
    }

    /// Model in effect, or an empty string when none is set
    #[must_use]
    pub fn model_or_empty(&self) -> &str {
        self.model.as_deref().unwrap_or("")
    }

    /// Concatenated message contents, in order
    #[must_use]
    pub fn joined_content(&self, separator: &str) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an explicit role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl MessageRole {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
