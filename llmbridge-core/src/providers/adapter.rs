//! Provider trait, capability set and descriptor
//!
//! Defines the one interface every backend client implements so callers never
//! branch on backend identity.

use crate::protocol::{ChatRequest, ChatResult, GenerationRequest, GenerationResult};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::DeltaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Core provider trait that all backend clients implement
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identity, endpoint, model and capabilities
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Backend identity string (e.g. "ollama")
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Optional features this provider offers
    fn capabilities(&self) -> Capabilities {
        self.descriptor().capabilities
    }

    /// Non-streaming text generation
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult>;

    /// Non-streaming chat completion
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResult>;

    /// Streaming text generation
    async fn generate_stream(&self, request: &GenerationRequest) -> ProviderResult<DeltaStream>;

    /// Streaming chat completion
    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<DeltaStream>;

    /// Names of the models the backend currently serves
    ///
    /// A backend that reports zero models yields an empty set.
    async fn list_models(&self) -> ProviderResult<BTreeSet<String>>;

    /// Best-effort liveness probe; never fails, returns false on any error
    async fn test_connection(&self) -> bool;
}

/// Optional features a provider declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Multi-message chat
    pub chat: bool,
    /// Tool / function calling
    pub tools: bool,
    /// Structured JSON output
    pub json: bool,
    /// Embeddings
    pub embed: bool,
}

impl Capabilities {
    /// Chat only, which is what both local backend families offer here
    pub const fn chat_only() -> Self {
        Self {
            chat: true,
            tools: false,
            json: false,
            embed: false,
        }
    }
}

/// Describes a constructed provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Backend identity string
    pub id: String,
    /// Base endpoint without a trailing slash
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Declared optional features
    pub capabilities: Capabilities,
}

/// Extract model names from a catalog response
///
/// Accepts both the Ollama shape (`{"models":[{"name":..}]}`) and the
/// OpenAI shape (`{"data":[{"id":..}]}`).
pub(crate) fn parse_model_catalog(body: &Value) -> ProviderResult<BTreeSet<String>> {
    let (entries, key) = if let Some(models) = body.get("models") {
        (models, "name")
    } else if let Some(data) = body.get("data") {
        (data, "id")
    } else {
        return Err(ProviderError::BackendProtocol(
            "model catalog has neither 'models' nor 'data'".to_string(),
        ));
    };

    if entries.is_null() {
        return Ok(BTreeSet::new());
    }

    let entries = entries.as_array().ok_or_else(|| {
        ProviderError::BackendProtocol("model catalog entries are not an array".to_string())
    })?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            entry
                .get(key)
                .or_else(|| entry.get("model"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect())
}

/// Strip trailing slashes so paths can be appended verbatim
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_catalog() {
        let body = json!({"models": [{"name": "qwen2.5-coder:7b"}, {"name": "llama3:8b"}]});
        let models = parse_model_catalog(&body).unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.contains("llama3:8b"));
    }

    #[test]
    fn test_openai_catalog() {
        let body = json!({"object": "list", "data": [{"id": "Qwen/Qwen2.5-7B"}]});
        let models = parse_model_catalog(&body).unwrap();
        assert_eq!(models.into_iter().collect::<Vec<_>>(), vec!["Qwen/Qwen2.5-7B"]);
    }

    #[test]
    fn test_empty_catalogs() {
        assert!(parse_model_catalog(&json!({"models": []})).unwrap().is_empty());
        assert!(parse_model_catalog(&json!({"models": null})).unwrap().is_empty());
        assert!(parse_model_catalog(&json!({"data": []})).unwrap().is_empty());
    }

    #[test]
    fn test_catalog_without_list_is_protocol_error() {
        assert!(matches!(
            parse_model_catalog(&json!({"status": "ok"})),
            Err(ProviderError::BackendProtocol(_))
        ));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:11434/"),
            "http://127.0.0.1:11434"
        );
    }
}
