//! Provider error types and handling

use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when talking to a local inference backend
///
/// Per-record decode failures inside a stream never surface here; the stream
/// decoder logs and skips them.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Unknown backend family or unusable provider settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection refused, DNS failure, connect or first-byte timeout
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Backend answered with a non-2xx status
    #[error("Backend returned HTTP {status}: {message}")]
    BackendHttp { status: u16, message: String },

    /// Top-level response was not well-formed JSON or lacked the expected field
    #[error("Malformed backend response: {0}")]
    BackendProtocol(String),

    /// An open stream produced nothing within the idle timeout
    #[error("Stream stalled: no data for {0:?}")]
    StreamStalled(Duration),

    /// The local-only network guard refused the target URL
    #[error("Blocked non-local request to {0}")]
    NetworkBlocked(String),
}

impl ProviderError {
    /// Whether re-sending the same exchange could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendUnreachable(_) => true,
            Self::BackendHttp { .. } => true,
            Self::BackendProtocol(_) => true,
            Self::StreamStalled(_) => true,
            Self::InvalidConfig(_) => false,
            Self::NetworkBlocked(_) => false,
        }
    }

    /// Short machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::BackendUnreachable(_) => "backend_unreachable",
            Self::BackendHttp { .. } => "backend_http_error",
            Self::BackendProtocol(_) => "backend_protocol_error",
            Self::StreamStalled(_) => "stream_stalled",
            Self::NetworkBlocked(_) => "network_blocked",
        }
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidConfig(_) => {
                "The selected backend is not configured correctly.".to_string()
            }
            Self::BackendUnreachable(_) => {
                "Could not reach the inference server. Is it running?".to_string()
            }
            Self::BackendHttp { status, .. } => {
                format!("The inference server returned an error (HTTP {}).", status)
            }
            Self::BackendProtocol(_) => {
                "The inference server sent a response that could not be understood.".to_string()
            }
            Self::StreamStalled(_) => "The inference server stopped responding.".to_string(),
            Self::NetworkBlocked(_) => {
                "Requests to non-local hosts are blocked by configuration.".to_string()
            }
        }
    }
}

/// Transport failures: connect or timeout is unreachable, a broken body is a
/// protocol error
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::BackendUnreachable(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProviderError::BackendProtocol(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::BackendHttp {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ProviderError::BackendUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::BackendProtocol(err.to_string())
    }
}
