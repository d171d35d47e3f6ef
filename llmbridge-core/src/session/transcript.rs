//! Caller-side view of a conversation built from lifecycle events
//!
//! Tracks the exchange currently streaming and ignores chunks or
//! completions carrying any other id, so stale or duplicated events never
//! corrupt the rendered text.

use crate::protocol::MessageRole;
use crate::session::events::ExchangeEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub text: String,
    /// Exchange that produced an assistant message
    pub exchange_id: Option<Uuid>,
}

/// Failure shown alongside the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptError {
    pub text: String,
    pub can_retry: bool,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<TranscriptMessage>,
    streaming: Option<Uuid>,
    loading: bool,
    last_error: Option<TranscriptError>,
    backend: Option<(String, String)>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    /// Exchange whose chunks are currently accepted
    pub fn streaming_exchange(&self) -> Option<Uuid> {
        self.streaming
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&TranscriptError> {
        self.last_error.as_ref()
    }

    /// `(provider, model)` from the latest backend change
    pub fn backend(&self) -> Option<(&str, &str)> {
        self.backend
            .as_ref()
            .map(|(provider, model)| (provider.as_str(), model.as_str()))
    }

    /// Record the text the user just sent
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.last_error = None;
        self.messages.push(TranscriptMessage {
            role: MessageRole::User,
            text: text.into(),
            exchange_id: None,
        });
    }

    /// Apply one event; returns false when it was ignored
    pub fn apply(&mut self, event: &ExchangeEvent) -> bool {
        match event {
            ExchangeEvent::Loading => {
                self.loading = true;
                true
            }
            ExchangeEvent::StreamingStart { exchange_id } => {
                self.loading = false;
                self.streaming = Some(*exchange_id);
                self.messages.push(TranscriptMessage {
                    role: MessageRole::Assistant,
                    text: String::new(),
                    exchange_id: Some(*exchange_id),
                });
                true
            }
            ExchangeEvent::StreamingChunk { exchange_id, text } => {
                match self.streaming_message(*exchange_id) {
                    Some(message) => {
                        message.text.push_str(text);
                        true
                    }
                    None => false,
                }
            }
            ExchangeEvent::StreamingComplete {
                exchange_id,
                full_text,
            } => match self.streaming_message(*exchange_id) {
                Some(message) => {
                    // Self-correcting even if chunks were missed
                    message.text.clone_from(full_text);
                    self.streaming = None;
                    true
                }
                None => false,
            },
            ExchangeEvent::Reply { exchange_id, text } => {
                self.loading = false;
                self.messages.push(TranscriptMessage {
                    role: MessageRole::Assistant,
                    text: text.clone(),
                    exchange_id: Some(*exchange_id),
                });
                true
            }
            ExchangeEvent::Error {
                exchange_id,
                text,
                can_retry,
                correlation_id,
                ..
            } => {
                // Errors without an exchange (busy, backend change) leave the
                // in-flight exchange alone
                if let Some(id) = exchange_id {
                    if self.streaming.map_or(true, |current| current == *id) {
                        self.loading = false;
                        self.streaming = None;
                    }
                }
                self.last_error = Some(TranscriptError {
                    text: text.clone(),
                    can_retry: *can_retry,
                    correlation_id: *correlation_id,
                });
                true
            }
            ExchangeEvent::BackendChanged { provider, model } => {
                self.backend = Some((provider.clone(), model.clone()));
                true
            }
        }
    }

    fn streaming_message(&mut self, exchange_id: Uuid) -> Option<&mut TranscriptMessage> {
        if self.streaming != Some(exchange_id) {
            return None;
        }
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.exchange_id == Some(exchange_id))
    }
}
