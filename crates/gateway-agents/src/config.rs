//! Agent configuration types.

use serde::{Deserialize, Serialize};

/// Requests per second granted to agents without an explicit limit
pub const DEFAULT_RATE_LIMIT_RPS: f64 = 5.0;
/// Burst size granted to agents without an explicit limit
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
/// Sampling temperature used when neither request nor agent sets one
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Completion token limit used when neither request nor agent sets one
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
/// Complexity score at or above which hybrid agents go to the cloud pool
pub const DEFAULT_COMPLEXITY_THRESHOLD: f64 = 0.5;

/// Provider pool an agent may draw from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Small local models only
    LocalSlm,
    /// Hosted cloud models only
    CloudLlm,
    /// Either pool
    #[default]
    Hybrid,
}

impl ModelTier {
    /// Wire name of the tier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalSlm => "local_slm",
            Self::CloudLlm => "cloud_llm",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent configuration.
///
/// Values are immutable once registered; re-registering an id replaces the
/// whole value. Fields missing from a JSON file take the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider pool
    pub model_tier: ModelTier,
    /// Sustained admission rate (requests per second)
    pub rate_limit_rps: f64,
    /// Maximum burst above the sustained rate
    pub rate_limit_burst: u32,
    /// Model used when a request does not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default completion token limit
    pub max_tokens: u32,
    /// Hybrid tier only: requests scoring at or above this use cloud providers first
    pub complexity_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            model_tier: ModelTier::Hybrid,
            rate_limit_rps: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            default_model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
        }
    }
}

impl AgentConfig {
    /// Default configuration for an agent id
    #[must_use]
    pub fn default_for(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Create a configuration with a display name
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default_for(id)
        }
    }

    /// Set the model tier
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    /// Set the admission rate and burst
    #[must_use]
    pub fn with_rate_limit(mut self, rps: f64, burst: u32) -> Self {
        self.rate_limit_rps = rps;
        self.rate_limit_burst = burst;
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Set the hybrid complexity threshold, clamped to `0.0..=1.0`
    #[must_use]
    pub fn with_complexity_threshold(mut self, threshold: f64) -> Self {
        self.complexity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set default sampling parameters
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Whether the limiter parameters differ from another config
    pub(crate) fn rate_differs(&self, other: &Self) -> bool {
        (self.rate_limit_rps - other.rate_limit_rps).abs() > f64::EPSILON
            || self.rate_limit_burst != other.rate_limit_burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_for() {
        let cfg = AgentConfig::default_for("unknown");
        assert_eq!(cfg.id, "unknown");
        assert_eq!(cfg.model_tier, ModelTier::Hybrid);
        assert!((cfg.rate_limit_rps - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.rate_limit_burst, 10);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let cfg: AgentConfig =
            serde_json::from_str(r#"{"id":"scout","model_tier":"local_slm","rate_limit_rps":2}"#)
                .unwrap();
        assert_eq!(cfg.model_tier, ModelTier::LocalSlm);
        assert!((cfg.rate_limit_rps - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.rate_limit_burst, DEFAULT_RATE_LIMIT_BURST);
        assert_eq!(cfg.max_tokens, DEFAULT_MAX_TOKENS);
        assert!((cfg.complexity_threshold - DEFAULT_COMPLEXITY_THRESHOLD).abs() < f64::EPSILON);
    }

    #[test]
    fn test_complexity_threshold_from_json_and_clamped() {
        let cfg: AgentConfig =
            serde_json::from_str(r#"{"id":"mix","complexity_threshold":0.3}"#).unwrap();
        assert!((cfg.complexity_threshold - 0.3).abs() < f64::EPSILON);

        let cfg = AgentConfig::default_for("mix").with_complexity_threshold(4.0);
        assert!((cfg.complexity_threshold - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tier_wire_names() {
        assert_eq!(serde_json::to_string(&ModelTier::CloudLlm).unwrap(), "\"cloud_llm\"");
        assert_eq!(ModelTier::LocalSlm.to_string(), "local_slm");
    }
}
