//! Ordered provider registry
//!
//! Built once from validated configuration and never mutated; a reload
//! builds a new registry and swaps it in whole.

use crate::config::{
    ConfigError, ConfigValidator, EndpointConfig, ProviderConfig, TollgateConfig, ValidationMode,
};
use crate::limiter::RateLimit;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One loaded provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    pub name: String,
    pub priority: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub enabled: bool,
    pub rate_limit: RateLimit,
    pub endpoint: Option<EndpointConfig>,
}

impl From<&ProviderConfig> for ProviderSpec {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            priority: config.priority,
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            enabled: config.enabled,
            rate_limit: RateLimit {
                window_size: Duration::from_millis(config.window_size_ms),
                max_calls: config.max_calls_per_window,
                backoff: Duration::from_millis(config.backoff_ms),
            },
            endpoint: config.endpoint.clone(),
        }
    }
}

/// Providers sorted ascending by priority, ties in declaration order
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<ProviderSpec>>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Build from a configuration, validating it first
    pub fn from_config(config: &TollgateConfig) -> Result<Self, ConfigError> {
        let mut config = config.clone();
        ConfigValidator::new().validate(&mut config)?;
        Ok(Self::from_validated(&config.providers))
    }

    /// Build from bare provider entries with strict validation
    pub fn from_providers(providers: Vec<ProviderConfig>) -> Result<Self, ConfigError> {
        let config = TollgateConfig {
            version: crate::config::SUPPORTED_VERSION.to_string(),
            validation: ValidationMode::Strict,
            log: Default::default(),
            retry: Default::default(),
            circuit: Default::default(),
            providers,
            metadata: Default::default(),
        };
        Self::from_config(&config)
    }

    fn from_validated(entries: &[ProviderConfig]) -> Self {
        let mut providers: Vec<Arc<ProviderSpec>> = entries
            .iter()
            .map(|entry| Arc::new(ProviderSpec::from(entry)))
            .collect();
        // stable: equal priorities keep declaration order
        providers.sort_by_key(|p| p.priority);

        let index = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();

        Self { providers, index }
    }

    /// Look up a provider by name, enabled or not
    pub fn get(&self, name: &str) -> Option<&Arc<ProviderSpec>> {
        self.index.get(name).map(|&i| &self.providers[i])
    }

    /// Enabled providers in priority order
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<ProviderSpec>> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Every provider in priority order, including disabled ones
    pub fn all(&self) -> &[Arc<ProviderSpec>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Admission limits keyed by provider name
    pub fn rate_limits(&self) -> HashMap<String, RateLimit> {
        self.providers
            .iter()
            .map(|p| (p.name.clone(), p.rate_limit))
            .collect()
    }
}
