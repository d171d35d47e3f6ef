//! Session error types

use crate::providers::ProviderError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Another exchange is still sending or streaming
    #[error("Exchange {active} is still in progress")]
    ExchangeBusy { active: Uuid },

    /// The exchange failed; `correlation_id` matches the error event
    #[error("Exchange {exchange_id} failed (correlation {correlation_id}): {source}")]
    Exchange {
        exchange_id: Uuid,
        correlation_id: Uuid,
        #[source]
        source: ProviderError,
    },

    /// The exchange was cancelled by the caller
    #[error("Exchange {exchange_id} was cancelled")]
    Cancelled { exchange_id: Uuid },

    /// Backend settings could not be turned into a provider
    #[error("Invalid backend settings: {0}")]
    Config(#[source] ProviderError),
}

impl SessionError {
    /// Whether sending again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExchangeBusy { .. } | Self::Cancelled { .. } => true,
            Self::Exchange { source, .. } => source.is_retryable(),
            Self::Config(_) => false,
        }
    }
}
