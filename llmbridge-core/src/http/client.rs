//! HTTP client implementation using reqwest

use crate::http::error::map_http_error;
use crate::http::guard::NetworkGuard;
use crate::http::HttpOptions;
use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::{Client, ClientBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Maximum non-streaming response size (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Default user agent
const USER_AGENT: &str = concat!("llmbridge/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
///
/// The underlying reqwest client carries no overall timeout so that long
/// streams are not cut off; non-streaming calls get a per-request timeout and
/// streaming calls a first-byte timeout instead.
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: Arc<Client>,

    /// Per-call / first-byte timeout
    request_timeout: Duration,

    /// Local-only guard applied before every request
    guard: NetworkGuard,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> ProviderResult<Self> {
        Self::with_options(&HttpOptions::default())
    }

    /// Create a new HTTP client from transport options
    pub fn with_options(options: &HttpOptions) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(options.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(options.connect_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            request_timeout: options.request_timeout,
            guard: NetworkGuard::new(options.local_only),
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// The guard this client enforces
    pub fn guard(&self) -> NetworkGuard {
        self.guard
    }

    /// POST a JSON body and parse the JSON response
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> ProviderResult<Value> {
        self.guard.ensure_local(url)?;
        let request_id = Uuid::new_v4();
        debug!(%url, %request_id, "POST");

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .header("X-Request-ID", request_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(url, request_id, e))?;

        self.read_json(url, request_id, response).await
    }

    /// GET a URL and parse the JSON response
    pub async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        self.guard.ensure_local(url)?;
        let request_id = Uuid::new_v4();
        debug!(%url, %request_id, "GET");

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .header("X-Request-ID", request_id.to_string())
            .send()
            .await
            .map_err(|e| transport_error(url, request_id, e))?;

        self.read_json(url, request_id, response).await
    }

    /// POST a JSON body and hand back the open response for streaming
    ///
    /// Only the wait for response headers is bounded by the request timeout;
    /// the body may stream for as long as the backend keeps producing data.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> ProviderResult<Response> {
        self.guard.ensure_local(url)?;
        let request_id = Uuid::new_v4();
        debug!(%url, %request_id, "POST (stream)");

        let send = self
            .client
            .post(url)
            .header("X-Request-ID", request_id.to_string())
            .header("Accept", "application/x-ndjson, text/event-stream")
            .json(body)
            .send();

        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| {
                warn!(%url, %request_id, "No response headers within {:?}", self.request_timeout);
                ProviderError::BackendUnreachable(format!(
                    "no response from {} within {:?} [request_id: {}]",
                    url, self.request_timeout, request_id
                ))
            })?
            .map_err(|e| transport_error(url, request_id, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            warn!(%url, %request_id, "Stream request failed with status {}", status);
            return Err(map_http_error(status, body));
        }

        Ok(response)
    }

    async fn read_json(
        &self,
        url: &str,
        request_id: Uuid,
        response: Response,
    ) -> ProviderResult<Value> {
        let status = response.status();
        debug!(%url, %request_id, "Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.ok();
            warn!(%url, %request_id, "Request failed with status {}", status);
            return Err(map_http_error(status, body));
        }

        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_size {
                return Err(ProviderError::BackendProtocol(format!(
                    "response size {} exceeds maximum {} [request_id: {}]",
                    content_length, self.max_response_size, request_id
                )));
            }
        }

        let text = response.text().await.map_err(|e| {
            ProviderError::BackendUnreachable(format!(
                "failed to read response body: {} [request_id: {}]",
                e, request_id
            ))
        })?;

        if text.len() > self.max_response_size {
            return Err(ProviderError::BackendProtocol(format!(
                "response size {} exceeds maximum {} [request_id: {}]",
                text.len(),
                self.max_response_size,
                request_id
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!(%url, %request_id, "Failed to parse response: {}", e);
            ProviderError::BackendProtocol(format!(
                "invalid JSON response: {} [request_id: {}]",
                e, request_id
            ))
        })
    }
}

fn transport_error(url: &str, request_id: Uuid, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        warn!(%url, %request_id, "Request timeout");
    } else {
        error!(%url, %request_id, "Request error: {}", err);
    }
    ProviderError::from(err)
}
