//! Orchestrator construction

use super::error::BuildError;
use super::Orchestrator;
use crate::calls::CallLogger;
use crate::clock::{Clock, SystemClock};
use crate::config::{CircuitConfig, TollgateConfig};
use crate::http::HttpAdapter;
use crate::limiter::RateLimiterState;
use crate::providers::{ProviderAdapter, ProviderRegistry, RetryPolicy};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for [`Orchestrator`]
///
/// Only the registry is required. The limiter and logger default to fresh
/// instances on the builder's clock (an in-memory call log). Every enabled
/// provider needs an adapter registered under its name.
#[derive(Default)]
pub struct OrchestratorBuilder {
    registry: Option<ProviderRegistry>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    limiter: Option<Arc<RateLimiterState>>,
    logger: Option<Arc<CallLogger>>,
    clock: Option<Arc<dyn Clock>>,
    retry: RetryPolicy,
    circuit: CircuitConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a loaded configuration
    ///
    /// The registry is validated according to `config.validation`, the call
    /// log goes to `log.path` when set, and an [`HttpAdapter`] is attached to
    /// every provider that declares an `endpoint`.
    pub fn from_config(config: &TollgateConfig) -> Result<Self, BuildError> {
        let registry = ProviderRegistry::from_config(config)?;
        let mut builder = Self::new()
            .retry_policy(config.retry.clone())
            .circuit(config.circuit);

        for spec in registry.all() {
            if spec.endpoint.is_some() {
                let adapter =
                    HttpAdapter::for_provider(spec).map_err(|source| BuildError::Adapter {
                        provider: spec.name.clone(),
                        source,
                    })?;
                builder = builder.adapter(spec.name.clone(), adapter);
            }
        }

        if let Some(path) = &config.log.path {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            builder = builder
                .logger(Arc::new(CallLogger::jsonl(path, Arc::clone(&clock))))
                .clock(clock);
        }

        Ok(builder.registry(registry))
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach the adapter for provider `name`
    pub fn adapter(self, name: impl Into<String>, adapter: impl ProviderAdapter + 'static) -> Self {
        self.shared_adapter(name, Arc::new(adapter))
    }

    pub fn shared_adapter(mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    /// Share an existing limiter; its limits are replaced with the registry's
    pub fn limiter(mut self, limiter: Arc<RateLimiterState>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn logger(mut self, logger: Arc<CallLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Error-rate trip settings for a limiter created by this builder
    pub fn circuit(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = circuit;
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let registry = self.registry.ok_or(BuildError::MissingRegistry)?;
        check_adapters(&registry, &self.adapters)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);

        let limiter = match self.limiter {
            Some(limiter) => {
                limiter.set_limits(registry.rate_limits());
                limiter
            }
            None => Arc::new(RateLimiterState::new(
                registry.rate_limits(),
                self.circuit,
                Arc::clone(&clock),
            )),
        };

        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(CallLogger::in_memory(Arc::clone(&clock))));

        for name in self.adapters.keys() {
            if registry.get(name).is_none() {
                debug!(provider = %name, "adapter registered for unknown provider");
            }
        }

        info!(
            providers = registry.len(),
            enabled = registry.enabled().count(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            registry: ArcSwap::from_pointee(registry),
            adapters: self.adapters,
            limiter,
            logger,
            clock,
            retry: self.retry,
        })
    }
}

/// Every enabled provider must have an adapter
pub(super) fn check_adapters(
    registry: &ProviderRegistry,
    adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
) -> Result<(), BuildError> {
    match registry.enabled().find(|p| !adapters.contains_key(&p.name)) {
        Some(missing) => Err(BuildError::MissingAdapter {
            provider: missing.name.clone(),
        }),
        None => Ok(()),
    }
}
