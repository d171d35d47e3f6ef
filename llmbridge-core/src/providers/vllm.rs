//! vLLM backend client (OpenAI-compatible SSE-chunk streaming)
//!
//! Endpoints: `/v1/chat/completions` and `/v1/models`. Generation is
//! expressed as a chat with an optional system message. Streaming events are
//! `data:`-framed JSON with text under `choices[0].delta.content`; the stream
//! ends with the literal `data: [DONE]`.

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

/// Default vLLM endpoint
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// vLLM provider implementation
pub struct VllmProvider {
    descriptor: ProviderDescriptor,
    http: HttpClient,
}

impl VllmProvider {
    /// Create a new vLLM provider; performs no I/O
    ///
    /// A base URL that already ends in `/v1` is accepted and normalised.
    pub fn new(base_url: &str, model: impl Into<String>, http: HttpClient) -> Self {
        let mut base_url = normalize_base_url(base_url);
        if let Some(stripped) = base_url.strip_suffix("/v1") {
            base_url = stripped.to_string();
        }

        Self {
            descriptor: ProviderDescriptor {
                id: "vllm".to_string(),
                base_url,
                model: model.into(),
                capabilities: Capabilities::chat_only(),
            },
            http,
        }
    }

    fn url(&self, call_kind: CallKind) -> String {
        let path = match call_kind {
            CallKind::Generate | CallKind::Chat => "/v1/chat/completions",
            CallKind::Models => "/v1/models",
        };
        format!("{}{}", self.descriptor.base_url, path)
    }

    fn body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.descriptor.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

fn usage_of(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    let count = |key: &str| {
        usage.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };
    TokenUsage::from_counts(count("prompt_tokens"), count("completion_tokens"))
}

/// Error carried in a 200 body or an SSE event
fn in_band_error(body: &Value) -> Option<String> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("unknown error");
        return Some(message.to_string());
    }
    if body.get("object").and_then(Value::as_str) == Some("error") {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Some(message.to_string());
    }
    None
}

/// Interpret one SSE event payload
///
/// Streaming chunks carry text under `delta`; some servers send full
/// `message` objects instead, so both shapes are accepted.
fn interpret_event(event: &Value) -> RecordAction {
    if let Some(message) = in_band_error(event) {
        return RecordAction::Fail(message);
    }

    let Some(choice) = event.pointer("/choices/0") else {
        // usage-only trailer or keep-alive object
        return RecordAction::Skip;
    };

    let text = choice
        .pointer("/delta/content")
        .or_else(|| choice.pointer("/message/content"))
        .and_then(Value::as_str);

    match text {
        Some(text) => RecordAction::Emit(text.to_string()),
        None => RecordAction::Skip,
    }
}

#[async_trait]
impl Provider for VllmProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        let chat = ChatRequest::from(request);
        self.chat(&chat).await.map(GenerationResult::from)
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResult> {
        let body = self
            .http
            .post_json(&self.url(CallKind::Chat), &self.body(request, false))
            .await?;

        if let Some(message) = in_band_error(&body) {
            return Err(ProviderError::BackendProtocol(message));
        }

        let message = body.pointer("/choices/0/message").ok_or_else(|| {
            ProviderError::BackendProtocol("completion lacks 'choices[0].message'".to_string())
        })?;

        // `content` may legitimately be null (e.g. an empty completion)
        let text = match message.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) => String::new(),
            _ => {
                return Err(ProviderError::BackendProtocol(
                    "completion message lacks 'content'".to_string(),
                ))
            }
        };

        Ok(ChatResult {
            text,
            usage: usage_of(&body),
        })
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> ProviderResult<DeltaStream> {
        let chat = ChatRequest::from(request);
        self.chat_stream(&chat).await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<DeltaStream> {
        let response = self
            .http
            .post_stream(&self.url(CallKind::Chat), &self.body(request, true))
            .await?;
        debug!(model = %self.descriptor.model, "vLLM chat stream opened");

        Ok(decode_deltas(
            response.bytes_stream(),
            Framing::Sse,
            interpret_event,
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
                warn!(base_url = %self.descriptor.base_url, "vLLM liveness probe failed: {}", e);
                false
            }
        }
    }
}
