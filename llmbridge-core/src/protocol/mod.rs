//! Protocol module for request/response structures
//!
//! This module defines the canonical data model shared by every backend:
//! generation and chat requests, their results, and streaming deltas.

pub mod types;

pub use types::{
    ChatRequest, ChatResult, GenerationRequest, GenerationResult, Message, MessageRole,
    StreamDelta, TokenUsage,
};
