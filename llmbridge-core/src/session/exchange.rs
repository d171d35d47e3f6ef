//! Exchange state machine
//!
//! ```text
//! Idle -> Sending -> Streaming -> Completed
//!           |            |
//!           +-> Completed (non-streaming)
//! Idle | Sending | Streaming -> Failed
//! ```
//!
//! `Completed` and `Failed` are terminal.

use crate::protocol::ChatRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle state of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl ExchangeState {
    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Sending or streaming
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Whether `next` is a legal successor
    pub fn can_transition_to(&self, next: ExchangeState) -> bool {
        use ExchangeState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Completed)
                | (Streaming, Completed)
                | (Idle | Sending | Streaming, Failed)
        )
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One request/response cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    id: Uuid,
    state: ExchangeState,
    text: String,
    request: ChatRequest,
    context_ids: Vec<String>,
    started_at: DateTime<Utc>,
}

impl Exchange {
    /// New idle exchange with a freshly minted id
    pub fn new(request: ChatRequest, context_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ExchangeState::Idle,
            text: String::new(),
            request,
            context_ids,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Accumulated reply text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    pub fn context_ids(&self) -> &[String] {
        &self.context_ids
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Move to `next`; illegal transitions are refused and logged
    pub(crate) fn transition(&mut self, next: ExchangeState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                exchange_id = %self.id,
                from = %self.state,
                to = %next,
                "Refusing illegal exchange transition"
            );
            return false;
        }
        debug!(exchange_id = %self.id, from = %self.state, to = %next, "Exchange transition");
        self.state = next;
        true
    }

    /// Append a streamed fragment; only legal while streaming
    pub(crate) fn append(&mut self, fragment: &str) -> bool {
        if self.state != ExchangeState::Streaming {
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    /// Set the whole reply of a non-streaming call
    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }
}
