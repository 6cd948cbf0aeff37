//! Configuration loading and validation
//!
//! Files are interpolated (`${VAR}`, `${VAR:-default}`), parsed from YAML or
//! JSON, then validated. A [`ConfigError`] means nothing from the document
//! may be used.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{interpolate_env_vars, referenced_vars};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    CircuitConfig, EndpointConfig, LogConfig, ProviderConfig, TollgateConfig, ValidationMode,
    SUPPORTED_VERSION,
};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<TollgateConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    from_yaml_str(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<TollgateConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    from_json_str(&content, &path.to_string_lossy())
}

/// Load a configuration, picking the format from the file extension
pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<TollgateConfig> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_from_json(path),
        _ => load_from_yaml(path),
    }
}

/// Parse and validate YAML text; `origin` names the source in errors
pub fn from_yaml_str(content: &str, origin: &str) -> ConfigResult<TollgateConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: TollgateConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;
    finish(config, origin)
}

/// Parse and validate JSON text; `origin` names the source in errors
pub fn from_json_str(content: &str, origin: &str) -> ConfigResult<TollgateConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: TollgateConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;
    finish(config, origin)
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn finish(mut config: TollgateConfig, origin: &str) -> ConfigResult<TollgateConfig> {
    let disabled = ConfigValidator::new().validate(&mut config)?;
    for err in &disabled {
        debug!(origin, error = %err, "provider entry disabled during validation");
    }
    info!(
        origin,
        providers = config.providers.len(),
        disabled = disabled.len(),
        "configuration loaded"
    );
    Ok(config)
}
