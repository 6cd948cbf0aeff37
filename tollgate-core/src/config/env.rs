//! Environment variable interpolation for configuration text
//!
//! `${VAR}` must be set; `${VAR:-fallback}` uses the fallback when `VAR` is
//! unset or empty. Interpolation runs on the raw document before parsing.

use super::error::ConfigError;
use regex::{Captures, Regex};
use std::env;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("placeholder pattern is valid")
    })
}

/// Replace every placeholder in `content`
///
/// Reports the first unset variable that has no fallback.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;

    let result = placeholder().replace_all(content, |cap: &Captures<'_>| {
        let var_name = &cap[1];
        match env::var(var_name) {
            Ok(value) if !value.is_empty() => value,
            _ => match cap.get(2) {
                Some(fallback) => fallback.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Names of all variables referenced by `content`
pub fn referenced_vars(content: &str) -> Vec<String> {
    placeholder()
        .captures_iter(content)
        .map(|cap| cap[1].to_string())
        .collect()
}
