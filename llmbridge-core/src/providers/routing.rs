//! Provider selection and hot-swap
//!
//! The backend family is a closed set ([`ProviderKind`]); this module is the
//! single place where a family name becomes a concrete client. The
//! [`ProviderRouter`] holds the current provider and lets configuration
//! changes swap it at runtime. Work already in flight keeps the `Arc` it
//! started with.

use crate::config::BridgeConfig;
use crate::http::{HttpClient, HttpOptions};
use crate::providers::adapter::Provider;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::{ollama, vllm, OllamaProvider, VllmProvider};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Ollama, NDJSON streaming
    Ollama,
    /// vLLM or any OpenAI-compatible server, SSE-chunk streaming
    Vllm,
}

impl ProviderKind {
    /// All known families
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Ollama, ProviderKind::Vllm];

    /// Identity string of the family
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Vllm => "vllm",
        }
    }

    /// Endpoint used when the configuration gives none
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => ollama::DEFAULT_BASE_URL,
            ProviderKind::Vllm => vllm::DEFAULT_BASE_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "vllm" => Ok(ProviderKind::Vllm),
            other => Err(ProviderError::InvalidConfig(format!(
                "unknown provider '{}' (expected one of: ollama, vllm)",
                other
            ))),
        }
    }
}

/// The `{provider, model, baseUrl?}` tuple a provider is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Backend family name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Endpoint; the family default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// Create settings for a family and model
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            base_url: None,
        }
    }

    /// Set an explicit endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Builds providers that share one HTTP connection pool
#[derive(Clone)]
pub struct ProviderFactory {
    http: HttpClient,
}

impl ProviderFactory {
    /// Factory over an existing HTTP client
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Factory with its own client built from transport options
    pub fn with_options(options: &HttpOptions) -> ProviderResult<Self> {
        Ok(Self::new(HttpClient::with_options(options)?))
    }

    /// Construct a provider; pure, performs no I/O
    pub fn create(&self, settings: &ProviderSettings) -> ProviderResult<Arc<dyn Provider>> {
        let kind: ProviderKind = settings.provider.parse()?;
        let base_url = settings
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| kind.default_base_url());

        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(
                base_url,
                settings.model.clone(),
                self.http.clone(),
            )),
            ProviderKind::Vllm => Arc::new(VllmProvider::new(
                base_url,
                settings.model.clone(),
                self.http.clone(),
            )),
        };
        Ok(provider)
    }
}

/// Construct a provider with default transport options
pub fn create_provider(settings: &ProviderSettings) -> ProviderResult<Arc<dyn Provider>> {
    ProviderFactory::with_options(&HttpOptions::default())?.create(settings)
}

/// Construct the provider named by persisted configuration
pub fn get_provider(config: &BridgeConfig) -> ProviderResult<Arc<dyn Provider>> {
    ProviderFactory::with_options(&config.http_options())?.create(&config.provider_settings())
}

/// Holds the current provider and swaps it atomically
pub struct ProviderRouter {
    factory: ProviderFactory,
    current: RwLock<Arc<dyn Provider>>,
}

impl ProviderRouter {
    /// Create a router whose first provider is built from `settings`
    pub fn new(factory: ProviderFactory, settings: &ProviderSettings) -> ProviderResult<Self> {
        let provider = factory.create(settings)?;
        Ok(Self::with_provider(factory, provider))
    }

    /// Create a router from persisted configuration
    pub fn from_config(config: &BridgeConfig) -> ProviderResult<Self> {
        let factory = ProviderFactory::with_options(&config.http_options())?;
        Self::new(factory, &config.provider_settings())
    }

    /// Create a router around an already constructed provider
    pub fn with_provider(factory: ProviderFactory, provider: Arc<dyn Provider>) -> Self {
        Self {
            factory,
            current: RwLock::new(provider),
        }
    }

    /// The provider new work should use
    pub fn current(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.current.read())
    }

    /// Build a provider from new settings and adopt it
    ///
    /// On error the current provider stays in place.
    pub fn switch(&self, settings: &ProviderSettings) -> ProviderResult<Arc<dyn Provider>> {
        let provider = self.factory.create(settings)?;
        self.replace(Arc::clone(&provider));
        Ok(provider)
    }

    /// Adopt an already constructed provider, returning the old one
    pub fn replace(&self, provider: Arc<dyn Provider>) -> Arc<dyn Provider> {
        let descriptor = provider.descriptor();
        info!(
            provider = %descriptor.id,
            model = %descriptor.model,
            base_url = %descriptor.base_url,
            "Switching provider"
        );
        std::mem::replace(&mut *self.current.write(), provider)
    }
}
