//! LLMBridge Core Library
//!
//! One streaming interface over locally hosted inference servers. Ollama
//! (NDJSON) and vLLM (OpenAI-compatible SSE) are hidden behind
//! [`Provider`]; a [`ChatSession`] drives exchanges against whichever
//! provider the [`ProviderRouter`] currently holds.

pub mod config;
pub mod context;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod session;

pub use config::BridgeConfig;
pub use protocol::{
    ChatRequest, ChatResult, GenerationRequest, GenerationResult, Message, MessageRole,
    StreamDelta, TokenUsage,
};
pub use providers::{
    create_provider, get_provider, DeltaStream, Provider, ProviderError, ProviderKind,
    ProviderResult, ProviderRouter, ProviderSettings,
};
pub use session::{ChatSession, ExchangeEvent, ExchangeState, SessionError};

/// Returns the version of the LLMBridge Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
