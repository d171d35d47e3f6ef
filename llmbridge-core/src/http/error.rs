//! HTTP error mapping utilities

use crate::providers::error::ProviderError;
use reqwest::StatusCode;
use serde_json::Value;

/// Longest slice of a raw error body carried into the error message
const MAX_BODY_EXCERPT: usize = 512;

/// Map a non-2xx status and optional response body to a ProviderError
pub fn map_http_error(status: StatusCode, body: Option<String>) -> ProviderError {
    let detail = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_message(&v));

    let message = detail
        .or_else(|| body.map(|b| excerpt(b.trim())))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("HTTP error")
                .to_string()
        });

    ProviderError::BackendHttp {
        status: status.as_u16(),
        message,
    }
}

/// Extract an error message from the JSON bodies local servers produce
fn extract_error_message(json: &Value) -> Option<String> {
    // OpenAI / vLLM format: { "error": { "message": "..." } }
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }

    // Ollama format: { "error": "..." }
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        return Some(error.to_string());
    }

    // Generic format: { "message": "..." } or FastAPI's { "detail": "..." }
    json.get("message")
        .or_else(|| json.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
