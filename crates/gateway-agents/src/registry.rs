//! Agent registry and per-agent admission control.
//!
//! The registry owns two maps: agent configurations and their token buckets.
//! Limiters are created on first use from the agent's configuration (or the
//! default one for unknown agents) and shared by every concurrent request for
//! that agent.

use crate::config::{AgentConfig, ModelTier};
use crate::error::RegistryError;
use crate::rate_limit::TokenBucket;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const HAIKU: &str = "anthropic/claude-3-haiku";

/// Seed personas: (id, name, rps, burst, max_tokens, temperature, default model)
const BUILT_IN_AGENTS: &[(&str, &str, f64, u32, u32, f32, &str)] = &[
    ("ada", "Ada Lovelace - Algorithmic Architect", 10.0, 20, 8000, 0.7, HAIKU),
    ("lea", "Lea Verou - Implementation Reviewer", 15.0, 30, 4000, 0.5, HAIKU),
    ("phil", "Phil Tetlock - Forecast Analyst", 10.0, 20, 8000, 0.3, HAIKU),
    ("david", "David Dunning - Metacognitive Guardian", 5.0, 10, 8000, 0.7, HAIKU),
    ("milton", "Milton Friedman - Ops Caretaker", 10.0, 20, 4000, 0.3, HAIKU),
    ("prompt-engineer", "Prompt Engineer", 10.0, 20, 4000, 0.5, HAIKU),
    ("ai-engineer", "AI Engineer", 10.0, 20, 4000, 0.5, HAIKU),
    ("universal-adapter", "Universal Protocol Adapter", 20.0, 40, 8192, 0.1, "openai/gpt-5.2-codex"),
];

/// Registry of agent configurations and rate limiters
#[derive(Debug)]
pub struct AgentRegistry {
    configs: RwLock<HashMap<String, Arc<AgentConfig>>>,
    limiters: RwLock<HashMap<String, Arc<TokenBucket>>>,
    defaults: AgentConfig,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::with_defaults(AgentConfig::default())
    }

    /// Create an empty registry whose unknown agents get the given settings
    #[must_use]
    pub fn with_defaults(defaults: AgentConfig) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            limiters: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    /// Insert or replace an agent configuration.
    ///
    /// Replacing an agent with different rate parameters discards its limiter;
    /// the next admission check builds a fresh one.
    pub fn register(&self, config: AgentConfig) {
        let id = config.id.clone();
        let config = Arc::new(config);
        let previous = self.configs.write().insert(id.clone(), Arc::clone(&config));

        let rate_changed = previous.is_some_and(|prev| prev.rate_differs(&config));
        if rate_changed && self.limiters.write().remove(&id).is_some() {
            debug!(agent_id = %id, "Agent rate limit changed, limiter reset");
        }

        debug!(
            agent_id = %id,
            tier = %config.model_tier,
            rps = config.rate_limit_rps,
            burst = config.rate_limit_burst,
            "Agent registered"
        );
    }

    /// Stored configuration, or the default one for unknown ids
    #[must_use]
    pub fn get(&self, id: &str) -> AgentConfig {
        self.configs.read().get(id).map_or_else(
            || AgentConfig {
                id: id.to_string(),
                name: id.to_string(),
                ..self.defaults.clone()
            },
            |cfg| cfg.as_ref().clone(),
        )
    }

    /// Whether an agent has been registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.configs.read().contains_key(id)
    }

    /// Registered agent ids
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.configs.read().keys().cloned().collect()
    }

    /// Registered configurations sorted by id
    #[must_use]
    pub fn configs(&self) -> Vec<Arc<AgentConfig>> {
        let mut configs: Vec<_> = self.configs.read().values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    /// Number of registered agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }

    /// Consume one admission token for the agent. Never blocks.
    pub fn allow(&self, id: &str) -> bool {
        self.limiter(id).try_acquire()
    }

    /// The agent's limiter, created on first use
    pub fn limiter(&self, id: &str) -> Arc<TokenBucket> {
        if let Some(limiter) = self.limiters.read().get(id) {
            return Arc::clone(limiter);
        }

        let mut limiters = self.limiters.write();
        if let Some(limiter) = limiters.get(id) {
            return Arc::clone(limiter);
        }

        let cfg = self.get(id);
        let (rps, burst) = if cfg.rate_limit_rps > 0.0 {
            (cfg.rate_limit_rps, cfg.rate_limit_burst)
        } else {
            (self.defaults.rate_limit_rps, self.defaults.rate_limit_burst)
        };
        let limiter = Arc::new(TokenBucket::new(rps, burst));
        limiters.insert(id.to_string(), Arc::clone(&limiter));
        limiter
    }

    /// Register every `*.json` file in a directory.
    ///
    /// Files without an `id` use their file stem. Loading stops at the first
    /// unreadable or malformed file; agents registered before it stay.
    pub fn load_from_dir(&self, dir: impl AsRef<Path>) -> Result<usize, RegistryError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| RegistryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|source| RegistryError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let mut config: AgentConfig =
                serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                    path: path.clone(),
                    source,
                })?;

            if config.id.is_empty() {
                config.id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            if config.name.is_empty() {
                config.name = config.id.clone();
            }

            self.register(config);
            loaded += 1;
        }

        info!(dir = %dir.display(), count = loaded, "Loaded agent configurations");
        Ok(loaded)
    }

    /// Register the built-in personas
    pub fn load_builtin_agents(&self) {
        for &(id, name, rps, burst, max_tokens, temperature, model) in BUILT_IN_AGENTS {
            self.register(
                AgentConfig::new(id, name)
                    .with_tier(ModelTier::CloudLlm)
                    .with_rate_limit(rps, burst)
                    .with_sampling(temperature, max_tokens)
                    .with_default_model(model),
            );
        }
        info!(count = BUILT_IN_AGENTS.len(), "Loaded built-in agents");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_unknown_agent_gets_defaults() {
        let registry = AgentRegistry::new();
        let cfg = registry.get("nobody");
        assert_eq!(cfg.id, "nobody");
        assert_eq!(cfg.model_tier, ModelTier::Hybrid);
        assert!((cfg.rate_limit_rps - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.rate_limit_burst, 10);
        assert!(!registry.contains("nobody"));
    }

    #[test]
    fn test_register_replaces_wholesale() {
        let registry = AgentRegistry::new();
        registry.register(AgentConfig::new("ada", "Ada").with_default_model("m1"));
        registry.register(AgentConfig::new("ada", "Ada v2"));
        let cfg = registry.get("ada");
        assert_eq!(cfg.name, "Ada v2");
        assert!(cfg.default_model.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_allow_respects_burst() {
        let registry = AgentRegistry::new();
        registry.register(AgentConfig::new("ada", "Ada").with_rate_limit(10.0, 20));

        let limiter = registry.limiter("ada");
        let now = Instant::now() + Duration::from_millis(1);
        let admitted = (0..21).filter(|_| limiter.try_acquire_at(now)).count();
        assert_eq!(admitted, 20);
    }

    #[test]
    fn test_allow_one_per_second() {
        let registry = AgentRegistry::new();
        registry.register(AgentConfig::new("slow", "Slow").with_rate_limit(1.0, 1));

        let limiter = registry.limiter("slow");
        let t0 = Instant::now() + Duration::from_millis(1);
        assert!(limiter.try_acquire_at(t0));
        assert!(!limiter.try_acquire_at(t0));
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_unknown_agent_limiter_uses_defaults() {
        let registry = AgentRegistry::new();
        let admitted = (0..15).filter(|_| registry.allow("stranger")).count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_limiter_is_shared() {
        let registry = AgentRegistry::new();
        let a = registry.limiter("ada");
        let b = registry.limiter("ada");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_rate_change_resets_limiter() {
        let registry = AgentRegistry::new();
        registry.register(AgentConfig::new("ada", "Ada").with_rate_limit(1.0, 1));
        let before = registry.limiter("ada");
        registry.register(AgentConfig::new("ada", "Ada").with_rate_limit(2.0, 4));
        let after = registry.limiter("ada");
        assert!(!Arc::ptr_eq(&before, &after));
        assert!((after.capacity() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_limiter_creation_is_race_free() {
        let registry = Arc::new(AgentRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.limiter("shared"))
            })
            .collect();
        let limiters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(limiters.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_builtin_agents() {
        let registry = AgentRegistry::new();
        registry.load_builtin_agents();
        assert_eq!(registry.len(), 8);
        let ua = registry.get("universal-adapter");
        assert_eq!(ua.model_tier, ModelTier::CloudLlm);
        assert_eq!(ua.rate_limit_burst, 40);
        assert_eq!(ua.default_model.as_deref(), Some("openai/gpt-5.2-codex"));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scout.json"),
            r#"{"name":"Scout","model_tier":"local_slm","rate_limit_rps":2,"rate_limit_burst":4}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let registry = AgentRegistry::new();
        let loaded = registry.load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);

        let scout = registry.get("scout");
        assert_eq!(scout.name, "Scout");
        assert_eq!(scout.model_tier, ModelTier::LocalSlm);
        assert_eq!(scout.rate_limit_burst, 4);
    }

    #[test]
    fn test_load_from_dir_stops_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"id":"alpha"}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("c.json"), r#"{"id":"gamma"}"#).unwrap();

        let registry = AgentRegistry::new();
        let err = registry.load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("gamma"));
    }

    #[test]
    fn test_load_from_missing_dir() {
        let registry = AgentRegistry::new();
        let err = registry.load_from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, RegistryError::ReadDir { .. }));
    }
}
