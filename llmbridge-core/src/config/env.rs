//! Environment variable interpolation for configuration files
//!
//! `${VAR}` is replaced by the variable's value; `${VAR:-fallback}` uses
//! `fallback` when the variable is unset. A reference without a fallback to
//! an unset variable is an error.

use super::error::ConfigError;
use regex::{Captures, Regex};
use std::env;

const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

/// Interpolate environment variables in raw configuration text
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |name| env::var(name).ok())
}

/// Interpolate using an arbitrary variable lookup
pub(crate) fn interpolate_with<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::ParseError {
        path: "<env interpolation>".to_string(),
        line: None,
        column: None,
        message: e.to_string(),
    })?;

    let mut missing: Option<String> = None;
    let result = pattern.replace_all(content, |cap: &Captures<'_>| {
        let name = &cap[1];
        match (lookup(name), cap.get(2)) {
            (Some(value), _) => value,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    // Report the first missing variable
    if let Some(var) = missing {
        return Err(ConfigError::EnvVarNotFound { var });
    }

    Ok(result.into_owned())
}
