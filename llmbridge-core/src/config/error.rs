//! Configuration error types

use std::fmt;
use thiserror::Error;

/// Error raised while loading or validating a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config '{path}'{}: {message}", location(.line, .column))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    /// `${VAR}` with no default and nothing set in the environment
    #[error("Config references unset environment variable '{var}'")]
    EnvVarNotFound { var: String },
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => format!(" at {}:{}", line, column),
        (Some(line), None) => format!(" at line {}", line),
        _ => String::new(),
    }
}

/// A rejected setting, located by a path such as `available_models[2].provider`
#[derive(Debug, Error)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
    /// How to fix it, when that is not obvious from the kind
    pub hint: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid setting '{}': {}", self.field_path, self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, "; {}", hint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    #[error("a value is required")]
    Missing,

    /// Not one of the supported backend families
    #[error("unknown backend family '{name}' (expected ollama or vllm)")]
    UnknownFamily { name: String },

    #[error("schema version '{found}' is not supported")]
    UnsupportedVersion { found: String },

    #[error("not a usable endpoint URL: {reason}")]
    BadUrl { reason: String },

    #[error("{value} is outside {allowed}")]
    OutOfRange { value: String, allowed: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn missing(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::Missing)
    }

    pub fn unknown_family(field_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::UnknownFamily { name: name.into() },
        )
    }

    pub fn bad_url(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::BadUrl {
                reason: reason.into(),
            },
        )
    }

    pub fn out_of_range(
        field_path: impl Into<String>,
        value: impl fmt::Display,
        allowed: impl Into<String>,
    ) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::OutOfRange {
                value: value.to_string(),
                allowed: allowed.into(),
            },
        )
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
