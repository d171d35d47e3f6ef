//! Exchange sessions
//!
//! A [`ChatSession`] drives one exchange at a time through
//! `Idle -> Sending -> Streaming -> Completed | Failed`, publishes lifecycle
//! events to its caller and records each finished exchange with an
//! [`AuditSink`]. [`Transcript`] is the matching reducer on the caller side.

pub mod audit;
mod chat;
mod error;
mod events;
mod exchange;
pub mod transcript;

pub use audit::{AuditEntry, AuditOutcome, AuditSink, JsonlAuditLog, NoopAudit};
pub use chat::{ChatSession, SessionOptions, CANCELLED_REASON};
pub use error::{SessionError, SessionResult};
pub use events::ExchangeEvent;
pub use exchange::{Exchange, ExchangeState};
pub use transcript::{Transcript, TranscriptError, TranscriptMessage};
