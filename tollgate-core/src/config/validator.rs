//! Configuration validation
//!
//! Document-level problems always reject the configuration. Problems in a
//! single provider entry either reject it too ([`ValidationMode::Strict`]) or
//! disable just that provider ([`ValidationMode::FailClosed`]).

use super::error::ValidationError;
use super::schema::{TollgateConfig, ValidationMode};
use tracing::warn;

/// Validates a parsed configuration according to its [`ValidationMode`]
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate in place
    ///
    /// In fail-closed mode invalid providers are switched off and their
    /// errors returned; in strict mode the first error is returned as `Err`.
    pub fn validate(
        &self,
        config: &mut TollgateConfig,
    ) -> Result<Vec<ValidationError>, ValidationError> {
        config.validate_document()?;

        match config.validation {
            ValidationMode::Strict => {
                self.validate_strict(config)?;
                Ok(Vec::new())
            }
            ValidationMode::FailClosed => Ok(self.quarantine(config)),
        }
    }

    /// Reject on the first invalid provider entry
    pub fn validate_strict(&self, config: &TollgateConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            provider.validate(&format!("providers[{}]", i))?;
        }
        Ok(())
    }

    /// Disable every invalid provider entry and report what was disabled
    pub fn quarantine(&self, config: &mut TollgateConfig) -> Vec<ValidationError> {
        let mut rejected = Vec::new();

        for (i, provider) in config.providers.iter_mut().enumerate() {
            if let Err(err) = provider.validate(&format!("providers[{}]", i)) {
                if provider.enabled {
                    warn!(provider = %provider.name, error = %err, "disabling invalid provider entry");
                }
                provider.enabled = false;
                rejected.push(err.with_context(format!("provider '{}' disabled", provider.name)));
            }
        }

        rejected
    }
}
