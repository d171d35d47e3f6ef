//! Ollama backend client (NDJSON streaming)
//!
//! Endpoints: `/api/generate`, `/api/chat`, `/api/tags`. Streaming bodies are
//! newline-delimited JSON; a line with `"done": true` ends the stream. Chat
//! lines nest text under `message.content`, generate lines expose a flat
//! `response` field.

use crate::http::{CallKind, HttpClient};
use crate::protocol::{
    ChatRequest, ChatResult, GenerationRequest, GenerationResult, Message, TokenUsage,
};
use crate::providers::adapter::{
    normalize_base_url, parse_model_catalog, Capabilities, Provider, ProviderDescriptor,
};
use crate::providers::decoder::{decode_deltas, Framing, RecordAction};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::DeltaStream;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Default Ollama endpoint
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Sampling options in Ollama's request shape
#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

/// Ollama provider implementation
pub struct OllamaProvider {
    descriptor: ProviderDescriptor,
    http: HttpClient,
}

impl OllamaProvider {
    /// Create a new Ollama provider; performs no I/O
    pub fn new(base_url: &str, model: impl Into<String>, http: HttpClient) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id: "ollama".to_string(),
                base_url: normalize_base_url(base_url),
                model: model.into(),
                capabilities: Capabilities::chat_only(),
            },
            http,
        }
    }

    fn url(&self, call_kind: CallKind) -> String {
        let path = match call_kind {
            CallKind::Generate => "/api/generate",
            CallKind::Chat => "/api/chat",
            CallKind::Models => "/api/tags",
        };
        format!("{}{}", self.descriptor.base_url, path)
    }

    fn generate_body(&self, request: &GenerationRequest, stream: bool) -> OllamaGenerateRequest<'_> {
        let prompt = match &request.system {
            Some(system) if !system.is_empty() => {
                format!("System: {}\n\n{}", system, request.prompt)
            }
            _ => request.prompt.clone(),
        };
        OllamaGenerateRequest {
            model: &self.descriptor.model,
            prompt,
            stream,
            options: options_for(request.temperature, request.max_tokens),
        }
    }

    fn chat_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.descriptor.model,
            messages: &request.messages,
            stream,
            options: options_for(request.temperature, request.max_tokens),
        }
    }
}

fn options_for(temperature: f32, max_tokens: u32) -> OllamaOptions {
    OllamaOptions {
        temperature,
        num_predict: max_tokens,
    }
}

fn usage_of(body: &Value) -> Option<TokenUsage> {
    let count = |key: &str| {
        body.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };
    TokenUsage::from_counts(count("prompt_eval_count"), count("eval_count"))
}

/// Interpret one NDJSON line; `pointer` locates the text fragment
fn interpret_line(line: &Value, pointer: &str) -> RecordAction {
    if let Some(error) = line.get("error").and_then(Value::as_str) {
        return RecordAction::Fail(error.to_string());
    }

    let text = line.pointer(pointer).and_then(Value::as_str);
    let done = line.get("done").and_then(Value::as_bool).unwrap_or(false);

    match (text, done) {
        (text, true) => RecordAction::Finish(text.map(str::to_string)),
        (Some(text), false) => RecordAction::Emit(text.to_string()),
        (None, false) => RecordAction::Skip,
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        let body = self
            .http
            .post_json(&self.url(CallKind::Generate), &self.generate_body(request, false))
            .await?;

        let text = body
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::BackendProtocol("generate response lacks 'response'".to_string())
            })?;

        Ok(GenerationResult {
            text: text.to_string(),
            usage: usage_of(&body),
        })
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResult> {
        let body = self
            .http
            .post_json(&self.url(CallKind::Chat), &self.chat_body(request, false))
            .await?;

        let text = body
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::BackendProtocol("chat response lacks 'message.content'".to_string())
            })?;

        Ok(ChatResult {
            text: text.to_string(),
            usage: usage_of(&body),
        })
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> ProviderResult<DeltaStream> {
        let response = self
            .http
            .post_stream(&self.url(CallKind::Generate), &self.generate_body(request, true))
            .await?;
        debug!(model = %self.descriptor.model, "Ollama generate stream opened");

        Ok(decode_deltas(
            response.bytes_stream(),
            Framing::Ndjson,
            |line: &Value| interpret_line(line, "/response"),
        ))
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<DeltaStream> {
        let response = self
            .http
            .post_stream(&self.url(CallKind::Chat), &self.chat_body(request, true))
            .await?;
        debug!(model = %self.descriptor.model, "Ollama chat stream opened");

        Ok(decode_deltas(
            response.bytes_stream(),
            Framing::Ndjson,
            |line: &Value| interpret_line(line, "/message/content"),
        ))
    }

    async fn list_models(&self) -> ProviderResult<BTreeSet<String>> {
        let body = self.http.get_json(&self.url(CallKind::Models)).await?;
        parse_model_catalog(&body)
    }

    async fn test_connection(&self) -> bool {
        match self.http.get_json(&self.url(CallKind::Models)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(base_url = %self.descriptor.base_url, "Ollama liveness probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(
            "http://127.0.0.1:11434/",
            "qwen2.5-coder:7b",
            HttpClient::new().unwrap(),
        )
    }

    #[test]
    fn test_urls() {
        let p = provider();
        assert_eq!(p.url(CallKind::Chat), "http://127.0.0.1:11434/api/chat");
        assert_eq!(p.url(CallKind::Generate), "http://127.0.0.1:11434/api/generate");
        assert_eq!(p.url(CallKind::Models), "http://127.0.0.1:11434/api/tags");
    }

    #[test]
    fn test_generate_body_prefixes_system() {
        let p = provider();
        let req = GenerationRequest::new("write a haiku", 32, 0.5).with_system("be brief");
        let body = serde_json::to_value(p.generate_body(&req, true)).unwrap();

        assert_eq!(body["prompt"], "System: be brief\n\nwrite a haiku");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 32);
        assert_eq!(body["model"], "qwen2.5-coder:7b");
    }

    #[test]
    fn test_chat_body_preserves_order() {
        let p = provider();
        let req = ChatRequest::new(
            vec![
                Message::system("s"),
                Message::user("u1"),
                Message::assistant("a1"),
                Message::user("u2"),
            ],
            16,
            0.0,
        );
        let body = serde_json::to_value(p.chat_body(&req, false)).unwrap();
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_interpret_chat_lines() {
        assert_eq!(
            interpret_line(&json!({"message": {"content": "pong"}}), "/message/content"),
            RecordAction::Emit("pong".into())
        );
        assert_eq!(
            interpret_line(&json!({"done": true}), "/message/content"),
            RecordAction::Finish(None)
        );
        assert_eq!(
            interpret_line(
                &json!({"message": {"content": "!"}, "done": true}),
                "/message/content"
            ),
            RecordAction::Finish(Some("!".into()))
        );
        assert_eq!(
            interpret_line(&json!({"status": "loading"}), "/message/content"),
            RecordAction::Skip
        );
        assert_eq!(
            interpret_line(&json!({"error": "out of memory"}), "/response"),
            RecordAction::Fail("out of memory".into())
        );
    }

    #[test]
    fn test_usage_counts() {
        let usage = usage_of(&json!({"prompt_eval_count": 12, "eval_count": 3})).unwrap();
        assert_eq!(usage.prompt, Some(12));
        assert_eq!(usage.completion, Some(3));
        assert!(usage_of(&json!({})).is_none());
    }

    #[test]
    fn test_usage_count_beyond_u32_is_dropped() {
        let body = json!({"prompt_eval_count": 5_000_000_000u64, "eval_count": 3});
        let usage = usage_of(&body).unwrap();
        assert_eq!(usage.prompt, None);
        assert_eq!(usage.completion, Some(3));
    }
}
