//! Configuration validation with field paths

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::{BackendConfig, BridgeConfig};
use crate::providers::ProviderKind;
use std::ops::RangeInclusive;

/// Supported schema version
pub const SCHEMA_VERSION: &str = "0.1";

const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;

/// Validates a parsed [`BridgeConfig`]
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration; the first violation is returned
    pub fn validate(&self, config: &BridgeConfig) -> Result<(), ValidationError> {
        self.validate_version(config)?;
        validate_family("provider", &config.provider)?;
        self.validate_backend("ollama", &config.ollama)?;
        self.validate_backend("vllm", &config.vllm)?;
        self.validate_available_models(config)?;
        self.validate_chat(config)?;

        if config.connection.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                "connection.connect_timeout_ms",
                0,
                "1..",
            ));
        }
        if config.connection.request_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                "connection.request_timeout_ms",
                0,
                "1..",
            ));
        }

        if config.audit.enabled && config.audit.path.is_none() {
            return Err(ValidationError::missing("audit.path")
                .with_hint("an enabled audit trail needs a file to write to"));
        }

        Ok(())
    }

    fn validate_version(&self, config: &BridgeConfig) -> Result<(), ValidationError> {
        if config.version.is_empty() {
            return Err(ValidationError::missing("version"));
        }
        if config.version != SCHEMA_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::UnsupportedVersion {
                    found: config.version.clone(),
                },
            )
            .with_hint(format!("set version to \"{}\"", SCHEMA_VERSION)));
        }
        Ok(())
    }

    fn validate_backend(&self, path: &str, backend: &BackendConfig) -> Result<(), ValidationError> {
        validate_base_url(&format!("{}.base_url", path), &backend.base_url)?;
        if backend.model.trim().is_empty() {
            return Err(ValidationError::missing(format!("{}.model", path)));
        }
        Ok(())
    }

    fn validate_available_models(&self, config: &BridgeConfig) -> Result<(), ValidationError> {
        for (i, entry) in config.available_models.iter().enumerate() {
            let path = format!("available_models[{}]", i);
            validate_family(&format!("{}.provider", path), &entry.provider)?;
            if entry.model.trim().is_empty() {
                return Err(ValidationError::missing(format!("{}.model", path)));
            }
            if let Some(base_url) = &entry.base_url {
                validate_base_url(&format!("{}.base_url", path), base_url)?;
            }
        }
        Ok(())
    }

    fn validate_chat(&self, config: &BridgeConfig) -> Result<(), ValidationError> {
        let chat = &config.chat;
        if chat.max_tokens == 0 {
            return Err(ValidationError::out_of_range("chat.max_tokens", 0, "1.."));
        }
        if !TEMPERATURE_RANGE.contains(&chat.temperature) {
            return Err(ValidationError::out_of_range(
                "chat.temperature",
                chat.temperature,
                format!(
                    "{}..={}",
                    TEMPERATURE_RANGE.start(),
                    TEMPERATURE_RANGE.end()
                ),
            ));
        }
        Ok(())
    }
}

fn validate_family(path: &str, name: &str) -> Result<(), ValidationError> {
    name.parse::<ProviderKind>()
        .map(|_| ())
        .map_err(|_| ValidationError::unknown_family(path, name))
}

fn validate_base_url(path: &str, base_url: &str) -> Result<(), ValidationError> {
    if base_url.trim().is_empty() {
        return Err(ValidationError::missing(path));
    }
    match url::Url::parse(base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::bad_url(
            path,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => Err(ValidationError::bad_url(path, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderSettings;
    use test_case::test_case;

    fn field_of(config: &BridgeConfig) -> String {
        ConfigValidator::new()
            .validate(config)
            .unwrap_err()
            .field_path
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::new().validate(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn test_wrong_version() {
        let config = BridgeConfig {
            version: "2".into(),
            ..Default::default()
        };
        assert_eq!(field_of(&config), "version");
    }

    #[test_case("ftp://127.0.0.1:11434" ; "unsupported scheme")]
    #[test_case("not a url" ; "unparseable")]
    #[test_case("" ; "empty")]
    fn test_bad_base_url(base_url: &str) {
        let mut config = BridgeConfig::default();
        config.ollama.base_url = base_url.into();
        assert_eq!(field_of(&config), "ollama.base_url");
    }

    #[test_case(-0.1 ; "below range")]
    #[test_case(2.5 ; "above range")]
    fn test_temperature_out_of_range(temperature: f32) {
        let mut config = BridgeConfig::default();
        config.chat.temperature = temperature;
        assert_eq!(field_of(&config), "chat.temperature");
    }

    #[test]
    fn test_zero_max_tokens() {
        let mut config = BridgeConfig::default();
        config.chat.max_tokens = 0;
        assert_eq!(field_of(&config), "chat.max_tokens");
    }

    #[test]
    fn test_unknown_family_in_available_models() {
        let mut config = BridgeConfig::default();
        config.available_models = vec![
            ProviderSettings::new("ollama", "llama3"),
            ProviderSettings::new("tgi", "x"),
        ];
        assert_eq!(field_of(&config), "available_models[1].provider");
    }

    #[test]
    fn test_unknown_active_provider() {
        let config = BridgeConfig {
            provider: "llamafile".into(),
            ..Default::default()
        };
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert_eq!(err.field_path, "provider");
        assert_eq!(
            err.kind,
            ValidationErrorKind::UnknownFamily {
                name: "llamafile".into()
            }
        );
    }

    #[test]
    fn test_enabled_audit_needs_path() {
        let mut config = BridgeConfig::default();
        config.audit.enabled = true;
        assert_eq!(field_of(&config), "audit.path");
    }
}
