//! Provider abstraction over local inference backends
//!
//! Each backend family has its own client that knows how to build requests
//! and decode its wire format. All of them implement [`Provider`], and the
//! router is the only place that picks a concrete client.

pub mod adapter;
pub mod decoder;
pub mod error;
pub mod ollama;
pub mod routing;
pub mod vllm;

use crate::protocol::StreamDelta;
use futures::Stream;
use std::pin::Pin;

pub use adapter::{Capabilities, Provider, ProviderDescriptor};
pub use decoder::{decode_deltas, Framing, Record, RecordAction, StreamDecoder};
pub use error::{ProviderError, ProviderResult};
pub use routing::{
    create_provider, get_provider, ProviderFactory, ProviderKind, ProviderRouter,
    ProviderSettings,
};

// Re-export concrete providers
pub use ollama::OllamaProvider;
pub use vllm::VllmProvider;

/// Lazy, single-pass sequence of deltas from a streaming call
///
/// Dropping the stream releases the underlying HTTP connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamDelta>> + Send>>;
