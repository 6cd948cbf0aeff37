//! Errors raised while loading a provider configuration

use std::fmt;
use thiserror::Error;

/// Loading failed; nothing from the document reaches the registry
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read provider config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Syntax errors and schema mismatches (missing or unknown fields)
    #[error("{path}:{}:{}: {message}", .line.unwrap_or(0), .column.unwrap_or(0))]
    Parse {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `${VAR}` with no default and nothing set in the environment
    #[error("${{{var}}} is referenced but not set")]
    EnvVarNotFound { var: String },
}

/// One rejected setting
#[derive(Debug, Clone, Error)]
pub struct ValidationError {
    /// Dotted path into the document, e.g. `providers[1].timeout_ms`
    pub field_path: String,
    pub kind: ValidationErrorKind,
    /// The offending value or comparison, when it helps
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_path, self.kind)?;
        match &self.context {
            Some(ctx) => write!(f, " ({ctx})"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("must be set")]
    Missing,

    #[error("{message}")]
    OutOfRange { message: String },

    #[error("{message}")]
    Malformed { message: String },

    /// Two providers share a name, so ranking and lookup would be ambiguous
    #[error("provider '{name}' is declared more than once")]
    DuplicateProvider { name: String },

    #[error("not a usable endpoint URL: {message}")]
    InvalidUrl { message: String },

    #[error("config version {found:?} is not supported (this build reads {supported:?})")]
    UnsupportedVersion { supported: String, found: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::Missing)
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::OutOfRange { message })
    }

    pub fn invalid_format(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::Malformed { message })
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
