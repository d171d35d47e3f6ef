//! HTTP transport shared by every backend client
//!
//! This module implements the HTTP layer for LLMBridge, handling:
//! - Connection pooling and client management
//! - Connect and first-byte timeouts
//! - The local-only network guard
//! - Error mapping for non-2xx responses

pub mod client;
pub mod error;
pub mod guard;

pub use client::HttpClient;
pub use guard::NetworkGuard;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Type of API call being made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// Single-prompt text generation
    Generate,
    /// Chat completion
    Chat,
    /// Model catalog listing (also used as liveness probe)
    Models,
}

/// Transport options, usually derived from the connection config
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Timeout for a whole non-streaming call, and for the first byte of a stream
    pub request_timeout: Duration,

    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,

    /// Refuse any host that is not loopback
    pub local_only: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            max_idle_per_host: 4,
            local_only: true,
        }
    }
}

impl HttpOptions {
    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request / first-byte timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the idle pool size per host
    pub fn with_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.max_idle_per_host = max_idle;
        self
    }

    /// Allow or refuse non-loopback hosts
    pub fn with_local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }
}
