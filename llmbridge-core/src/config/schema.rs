//! Configuration schema structures with serde support

use crate::http::HttpOptions;
use crate::providers::{ollama, vllm, ProviderKind, ProviderSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default model for both backend families
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";

/// Default system preamble for chat exchanges
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful coding assistant. Prefer short, accurate answers. Return code in triple backticks.";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Schema version (required, no default)
    pub version: String,

    /// Active backend family
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Ollama endpoint and model
    #[serde(default = "BackendConfig::ollama")]
    pub ollama: BackendConfig,

    /// vLLM endpoint and model
    #[serde(default = "BackendConfig::vllm")]
    pub vllm: BackendConfig,

    /// Backend/model pairs offered for switching
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_models: Vec<ProviderSettings>,

    /// Transport settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Chat request defaults
    #[serde(default)]
    pub chat: ChatConfig,

    /// Exchange audit trail
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Endpoint and model of one backend family
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL without the API path
    pub base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
}

impl BackendConfig {
    pub fn ollama() -> Self {
        Self {
            base_url: ollama::DEFAULT_BASE_URL.to_string(),
            model: default_model(),
        }
    }

    pub fn vllm() -> Self {
        Self {
            base_url: vllm::DEFAULT_BASE_URL.to_string(),
            model: default_model(),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout for a whole non-streaming call, or for the response head of a
    /// streaming one, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum silence between two stream deltas in milliseconds; 0 disables
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Refuse requests to anything but loopback hosts
    #[serde(default = "default_true")]
    pub local_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            stream_idle_timeout_ms: default_stream_idle_timeout(),
            max_idle_per_host: default_max_idle(),
            local_only: true,
        }
    }
}

/// Chat request defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// System message prepended to every exchange
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Run a liveness probe before each exchange
    #[serde(default)]
    pub probe_before_send: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            probe_before_send: false,
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Record each finished exchange
    #[serde(default)]
    pub enabled: bool,

    /// JSON-lines file the entries are appended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions for serde
fn default_true() -> bool { true }
fn default_provider() -> String { ProviderKind::Ollama.as_str().to_string() }
fn default_model() -> String { DEFAULT_MODEL.to_string() }
fn default_connect_timeout() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 60000 }
fn default_stream_idle_timeout() -> u64 { 60000 }
fn default_max_idle() -> usize { 4 }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }
fn default_max_tokens() -> u32 { 512 }
fn default_temperature() -> f32 { 0.3 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            provider: default_provider(),
            ollama: BackendConfig::ollama(),
            vllm: BackendConfig::vllm(),
            available_models: Vec::new(),
            connection: ConnectionConfig::default(),
            chat: ChatConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Section of the active family; unknown names fall back to Ollama and
    /// are rejected later when the provider is built
    fn active_backend(&self) -> &BackendConfig {
        match self.provider.parse::<ProviderKind>() {
            Ok(ProviderKind::Vllm) => &self.vllm,
            _ => &self.ollama,
        }
    }

    /// Settings tuple the router builds the active provider from
    pub fn provider_settings(&self) -> ProviderSettings {
        let backend = self.active_backend();
        ProviderSettings {
            provider: self.provider.clone(),
            model: backend.model.clone(),
            base_url: Some(backend.base_url.clone()),
        }
    }

    /// Make `settings` the active backend
    ///
    /// The family's section is updated so the change survives a save.
    pub fn set_active(&mut self, settings: &ProviderSettings) -> Result<(), crate::ProviderError> {
        let kind: ProviderKind = settings.provider.parse()?;
        let section = match kind {
            ProviderKind::Ollama => &mut self.ollama,
            ProviderKind::Vllm => &mut self.vllm,
        };
        section.model = settings.model.clone();
        if let Some(base_url) = settings.base_url.as_ref().filter(|u| !u.trim().is_empty()) {
            section.base_url = base_url.clone();
        }
        self.provider = kind.as_str().to_string();
        Ok(())
    }

    /// Transport options for the shared HTTP client
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions::default()
            .with_connect_timeout(Duration::from_millis(self.connection.connect_timeout_ms))
            .with_request_timeout(Duration::from_millis(self.connection.request_timeout_ms))
            .with_max_idle_per_host(self.connection.max_idle_per_host)
            .with_local_only(self.connection.local_only)
    }

    /// Stall guard for streaming exchanges, `None` when disabled
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        match self.connection.stream_idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config: BridgeConfig = serde_yaml::from_str("version: \"0.1\"\n").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.chat.max_tokens, 512);
        assert_eq!(config.connection.max_idle_per_host, 4);
        assert!(config.connection.local_only);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<BridgeConfig, _> =
            serde_yaml::from_str("version: \"0.1\"\nproviders: []\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_provider_settings_follow_active_family() {
        let mut config = BridgeConfig::default();
        let settings = config.provider_settings();
        assert_eq!(settings.provider, "ollama");
        assert_eq!(settings.base_url.as_deref(), Some("http://127.0.0.1:11434"));

        config.provider = "vllm".into();
        config.vllm.model = "Qwen/Qwen2.5-Coder-7B".into();
        let settings = config.provider_settings();
        assert_eq!(settings.model, "Qwen/Qwen2.5-Coder-7B");
        assert_eq!(settings.base_url.as_deref(), Some("http://127.0.0.1:8000"));
    }

    #[test]
    fn test_set_active_updates_section() {
        let mut config = BridgeConfig::default();
        config
            .set_active(&ProviderSettings::new("VLLM", "m2").with_base_url("http://localhost:9000"))
            .unwrap();
        assert_eq!(config.provider, "vllm");
        assert_eq!(config.vllm.model, "m2");
        assert_eq!(config.vllm.base_url, "http://localhost:9000");
        assert_eq!(config.ollama, BackendConfig::ollama());

        assert!(config.set_active(&ProviderSettings::new("tgi", "m")).is_err());
        assert_eq!(config.provider, "vllm");
    }

    #[test]
    fn test_idle_timeout_zero_disables() {
        let mut config = BridgeConfig::default();
        assert_eq!(config.stream_idle_timeout(), Some(Duration::from_secs(60)));
        config.connection.stream_idle_timeout_ms = 0;
        assert_eq!(config.stream_idle_timeout(), None);
    }
}
