//! Named provider construction.
//!
//! Providers are created from configuration by name. Each name maps to a
//! constructor; the binary asks the factory for the configured primary and
//! fallback names in order.

use crate::mock::{MockProvider, MOCK_PROVIDER_ID};
use gateway_core::{GatewayError, GatewayResult, SharedProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Settings handed to a provider constructor
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// Model used when neither request nor agent names one
    pub default_model: Option<String>,
}

impl ProviderSettings {
    /// Set the default model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

/// Provider constructor
pub type ProviderConstructor =
    Arc<dyn Fn(&str, &ProviderSettings) -> GatewayResult<SharedProvider> + Send + Sync>;

/// Map of provider names to constructors
#[derive(Clone, Default)]
pub struct ProviderFactory {
    constructors: HashMap<String, ProviderConstructor>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("names", &self.names())
            .finish()
    }
}

impl ProviderFactory {
    /// Factory with no constructors
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the bundled providers registered
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(MOCK_PROVIDER_ID, |id, settings| {
            let mut provider = MockProvider::new(id);
            if let Some(model) = &settings.default_model {
                provider = provider.with_default_model(model);
            }
            Ok(Arc::new(provider) as SharedProvider)
        });
        factory
    }

    /// Register or replace a constructor
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &ProviderSettings) -> GatewayResult<SharedProvider> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build one provider by name
    pub fn build(&self, name: &str, settings: &ProviderSettings) -> GatewayResult<SharedProvider> {
        let constructor = self.constructors.get(name).ok_or_else(|| {
            GatewayError::Configuration(format!("unknown provider: {name}"))
        })?;
        constructor(name, settings)
    }

    /// Build the primary provider followed by its fallbacks.
    ///
    /// Duplicates and empty names are skipped; names that fail to build are
    /// logged and skipped.
    #[must_use]
    pub fn build_ordered(
        &self,
        primary: &str,
        fallbacks: &[String],
        settings: &ProviderSettings,
    ) -> Vec<SharedProvider> {
        let mut seen = HashSet::new();
        let mut providers = Vec::new();

        for name in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            match self.build(name, settings) {
                Ok(provider) => {
                    info!(provider = %name, "Provider initialized");
                    providers.push(provider);
                }
                Err(e) => warn!(provider = %name, error = %e, "Skipping provider"),
            }
        }
        providers
    }
}
