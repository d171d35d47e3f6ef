//! Lifecycle events delivered to the caller
//!
//! Serialized as `{"type": "streamingChunk", "exchangeId": .., "text": ..}`
//! so a UI can forward them verbatim.

use crate::providers::ProviderError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event emitted by a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExchangeEvent {
    /// A send was accepted and the request is being prepared
    Loading,

    /// A streamed reply began; precedes any chunk of the exchange
    StreamingStart { exchange_id: Uuid },

    /// One streamed fragment
    StreamingChunk { exchange_id: Uuid, text: String },

    /// The stream ended; `full_text` is the concatenation of every chunk
    StreamingComplete { exchange_id: Uuid, full_text: String },

    /// Whole reply of a non-streaming exchange
    Reply { exchange_id: Uuid, text: String },

    /// The exchange failed; emitted at most once per exchange
    Error {
        /// Exchange the failure belongs to, if one was started
        exchange_id: Option<Uuid>,
        /// User-safe message
        text: String,
        /// Raw failure detail
        reason: String,
        can_retry: bool,
        correlation_id: Uuid,
    },

    /// The session now talks to a different backend or model
    BackendChanged { provider: String, model: String },
}

impl ExchangeEvent {
    /// Error event for a provider failure
    pub fn from_provider_error(
        exchange_id: Option<Uuid>,
        correlation_id: Uuid,
        err: &ProviderError,
    ) -> Self {
        Self::Error {
            exchange_id,
            text: err.user_message(),
            reason: err.to_string(),
            can_retry: err.is_retryable(),
            correlation_id,
        }
    }

    /// Exchange the event belongs to, if any
    pub fn exchange_id(&self) -> Option<Uuid> {
        match self {
            Self::StreamingStart { exchange_id }
            | Self::StreamingChunk { exchange_id, .. }
            | Self::StreamingComplete { exchange_id, .. }
            | Self::Reply { exchange_id, .. } => Some(*exchange_id),
            Self::Error { exchange_id, .. } => *exchange_id,
            Self::Loading | Self::BackendChanged { .. } => None,
        }
    }
}
