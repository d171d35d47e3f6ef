//! Configuration module for LLMBridge
//!
//! Persisted settings: the active backend family, each family's endpoint and
//! model, transport timeouts, chat defaults and the audit trail.

mod env;
mod error;
mod schema;
mod validator;

pub use env::interpolate_env_vars;
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    AuditConfig, BackendConfig, BridgeConfig, ChatConfig, ConnectionConfig, DEFAULT_MODEL,
    DEFAULT_SYSTEM_PROMPT,
};
pub use validator::{ConfigValidator, SCHEMA_VERSION};

use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: BridgeConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    debug!(path = %path.display(), provider = %config.provider, "Loaded configuration");
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: BridgeConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    debug!(path = %path.display(), provider = %config.provider, "Loaded configuration");
    Ok(config)
}

/// Load by extension: `.json` is JSON, anything else YAML
pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_from_json(path),
        _ => load_from_yaml(path),
    }
}

fn read_interpolated(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    env::interpolate_env_vars(&content)
}
