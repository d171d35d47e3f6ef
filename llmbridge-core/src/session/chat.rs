//! Chat session driving one exchange at a time

use crate::config::{BridgeConfig, DEFAULT_SYSTEM_PROMPT};
use crate::protocol::{ChatRequest, Message, StreamDelta};
use crate::providers::{
    DeltaStream, Provider, ProviderDescriptor, ProviderError, ProviderResult, ProviderRouter,
    ProviderSettings,
};
use crate::session::audit::{self, AuditEntry, AuditOutcome, AuditSink};
use crate::session::error::{SessionError, SessionResult};
use crate::session::events::ExchangeEvent;
use crate::session::exchange::{Exchange, ExchangeState};
use futures::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reason carried by the error event of a cancelled exchange
pub const CANCELLED_REASON: &str = "cancelled";

/// Per-session request defaults
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// System message sent before the user text; empty sends none
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Probe the backend before each exchange
    pub probe_before_send: bool,
    /// Longest silence tolerated between two deltas
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 512,
            temperature: 0.3,
            probe_before_send: false,
            stream_idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl From<&BridgeConfig> for SessionOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            system_prompt: config.chat.system_prompt.clone(),
            max_tokens: config.chat.max_tokens,
            temperature: config.chat.temperature,
            probe_before_send: config.chat.probe_before_send,
            stream_idle_timeout: config.stream_idle_timeout(),
        }
    }
}

/// Why an exchange stopped early
enum Abort {
    Failed(ProviderError),
    Cancelled,
}

impl From<ProviderError> for Abort {
    fn from(err: ProviderError) -> Self {
        Abort::Failed(err)
    }
}

struct ActiveExchange {
    id: Uuid,
    cancel: CancellationToken,
}

/// Releases the session's in-flight slot when the exchange ends
struct ActiveSlot<'a> {
    slot: &'a Mutex<Option<ActiveExchange>>,
    id: Uuid,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|active| active.id) == Some(self.id) {
            *slot = None;
        }
    }
}

/// Orchestrates chat exchanges against the router's current provider
///
/// At most one exchange is in flight per session; a second `send_chat`
/// while one is sending or streaming fails with
/// [`SessionError::ExchangeBusy`]. Lifecycle events go to the receiver
/// returned by [`ChatSession::new`].
pub struct ChatSession {
    router: Arc<ProviderRouter>,
    audit: Arc<dyn AuditSink>,
    options: SessionOptions,
    events: mpsc::UnboundedSender<ExchangeEvent>,
    active: Mutex<Option<ActiveExchange>>,
}

impl ChatSession {
    /// Create a session and the receiver its events are delivered to
    pub fn new(
        router: Arc<ProviderRouter>,
        audit: Arc<dyn AuditSink>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ExchangeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            router,
            audit,
            options,
            events,
            active: Mutex::new(None),
        };
        (session, receiver)
    }

    /// Build router, audit sink and options from configuration
    pub fn from_config(
        config: &BridgeConfig,
    ) -> SessionResult<(Self, mpsc::UnboundedReceiver<ExchangeEvent>)> {
        let router = ProviderRouter::from_config(config).map_err(SessionError::Config)?;
        Ok(Self::new(
            Arc::new(router),
            audit::sink_from_config(&config.audit),
            SessionOptions::from(config),
        ))
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Id of the exchange currently sending or streaming
    pub fn active_exchange(&self) -> Option<Uuid> {
        self.active.lock().as_ref().map(|active| active.id)
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Run one chat exchange to completion
    ///
    /// Returns the terminal exchange on success. Every failure is also
    /// reported once as an [`ExchangeEvent::Error`].
    pub async fn send_chat(
        &self,
        text: &str,
        context_ids: Vec<String>,
        streaming: bool,
    ) -> SessionResult<Exchange> {
        let mut exchange = Exchange::new(self.build_request(text), context_ids);
        let cancel = CancellationToken::new();

        let _slot = match self.claim(exchange.id(), cancel.clone()) {
            Ok(slot) => slot,
            Err(active) => return Err(self.reject_busy(active)),
        };

        // In-flight work stays on this provider even if the router swaps
        let provider = self.router.current();
        info!(
            exchange_id = %exchange.id(),
            provider = %provider.id(),
            model = %provider.descriptor().model,
            streaming,
            "Starting exchange"
        );

        self.emit(ExchangeEvent::Loading);
        exchange.transition(ExchangeState::Sending);

        let result = if streaming {
            self.run_streaming(provider.as_ref(), &mut exchange, &cancel)
                .await
        } else {
            self.run_single(provider.as_ref(), &mut exchange, &cancel)
                .await
        };

        match result {
            Ok(()) => {
                info!(
                    exchange_id = %exchange.id(),
                    chars = exchange.text().chars().count(),
                    "Exchange completed"
                );
                self.record(provider.as_ref(), &exchange, AuditOutcome::Completed, None);
                Ok(exchange)
            }
            Err(Abort::Cancelled) => {
                exchange.transition(ExchangeState::Failed);
                info!(exchange_id = %exchange.id(), "Exchange cancelled");
                self.emit(ExchangeEvent::Error {
                    exchange_id: Some(exchange.id()),
                    text: "The request was cancelled.".to_string(),
                    reason: CANCELLED_REASON.to_string(),
                    can_retry: true,
                    correlation_id: Uuid::new_v4(),
                });
                self.record(
                    provider.as_ref(),
                    &exchange,
                    AuditOutcome::Cancelled,
                    Some(CANCELLED_REASON.to_string()),
                );
                Err(SessionError::Cancelled {
                    exchange_id: exchange.id(),
                })
            }
            Err(Abort::Failed(source)) => {
                exchange.transition(ExchangeState::Failed);
                let correlation_id = Uuid::new_v4();
                error!(
                    exchange_id = %exchange.id(),
                    correlation_id = %correlation_id,
                    code = source.code(),
                    "Exchange failed: {}",
                    source
                );
                self.emit(ExchangeEvent::from_provider_error(
                    Some(exchange.id()),
                    correlation_id,
                    &source,
                ));
                self.record(
                    provider.as_ref(),
                    &exchange,
                    AuditOutcome::Failed,
                    Some(source.to_string()),
                );
                Err(SessionError::Exchange {
                    exchange_id: exchange.id(),
                    correlation_id,
                    source,
                })
            }
        }
    }

    /// Switch backend or model for subsequent exchanges
    ///
    /// An exchange already in flight keeps the provider it started with.
    pub fn change_backend(
        &self,
        provider: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
    ) -> SessionResult<ProviderDescriptor> {
        let settings = ProviderSettings {
            provider: provider.into(),
            model: model.into(),
            base_url,
        };

        match self.router.switch(&settings) {
            Ok(provider) => {
                let descriptor = provider.descriptor().clone();
                self.emit(ExchangeEvent::BackendChanged {
                    provider: descriptor.id.clone(),
                    model: descriptor.model.clone(),
                });
                Ok(descriptor)
            }
            Err(err) => {
                let correlation_id = Uuid::new_v4();
                warn!(
                    provider = %settings.provider,
                    correlation_id = %correlation_id,
                    "Backend change rejected: {}",
                    err
                );
                self.emit(ExchangeEvent::from_provider_error(None, correlation_id, &err));
                Err(SessionError::Config(err))
            }
        }
    }

    /// Abandon the in-flight exchange, if any
    ///
    /// Local only: the stream is dropped, which closes the connection; no
    /// request is sent to the backend.
    pub fn cancel(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => {
                debug!(exchange_id = %active.id, "Cancelling exchange");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn build_request(&self, text: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.options.system_prompt.is_empty() {
            messages.push(Message::system(self.options.system_prompt.clone()));
        }
        messages.push(Message::user(text));
        ChatRequest::new(messages, self.options.max_tokens, self.options.temperature)
    }

    fn claim(&self, id: Uuid, cancel: CancellationToken) -> Result<ActiveSlot<'_>, Uuid> {
        let mut slot = self.active.lock();
        if let Some(active) = slot.as_ref() {
            return Err(active.id);
        }
        *slot = Some(ActiveExchange { id, cancel });
        Ok(ActiveSlot {
            slot: &self.active,
            id,
        })
    }

    fn reject_busy(&self, active: Uuid) -> SessionError {
        let err = SessionError::ExchangeBusy { active };
        let correlation_id = Uuid::new_v4();
        warn!(active = %active, correlation_id = %correlation_id, "Rejecting send: {}", err);
        self.emit(ExchangeEvent::Error {
            exchange_id: None,
            text: "A reply is still in progress. Wait for it to finish or cancel it.".to_string(),
            reason: err.to_string(),
            can_retry: true,
            correlation_id,
        });
        err
    }

    async fn probe(&self, provider: &dyn Provider, cancel: &CancellationToken) -> Result<(), Abort> {
        if !self.options.probe_before_send {
            return Ok(());
        }
        if or_cancel(cancel, provider.test_connection()).await? {
            Ok(())
        } else {
            Err(Abort::Failed(ProviderError::BackendUnreachable(format!(
                "liveness probe of {} failed",
                provider.descriptor().base_url
            ))))
        }
    }

    async fn run_single(
        &self,
        provider: &dyn Provider,
        exchange: &mut Exchange,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        self.probe(provider, cancel).await?;
        let result = or_cancel(cancel, provider.chat(exchange.request())).await??;

        exchange.set_text(result.text);
        exchange.transition(ExchangeState::Completed);
        self.emit(ExchangeEvent::Reply {
            exchange_id: exchange.id(),
            text: exchange.text().to_string(),
        });
        Ok(())
    }

    async fn run_streaming(
        &self,
        provider: &dyn Provider,
        exchange: &mut Exchange,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        self.probe(provider, cancel).await?;
        let mut stream = or_cancel(cancel, provider.chat_stream(exchange.request())).await??;

        let exchange_id = exchange.id();
        exchange.transition(ExchangeState::Streaming);
        self.emit(ExchangeEvent::StreamingStart { exchange_id });

        let idle_timeout = self.options.stream_idle_timeout;
        while let Some(delta) = or_cancel(cancel, next_delta(&mut stream, idle_timeout)).await?? {
            if delta.content.is_empty() {
                continue;
            }
            exchange.append(&delta.content);
            self.emit(ExchangeEvent::StreamingChunk {
                exchange_id,
                text: delta.content,
            });
        }
        drop(stream);

        exchange.transition(ExchangeState::Completed);
        self.emit(ExchangeEvent::StreamingComplete {
            exchange_id,
            full_text: exchange.text().to_string(),
        });
        Ok(())
    }

    fn record(
        &self,
        provider: &dyn Provider,
        exchange: &Exchange,
        outcome: AuditOutcome,
        error: Option<String>,
    ) {
        let prompt = exchange.request().last_user_text().unwrap_or_default();
        let descriptor = provider.descriptor();
        let mut entry = AuditEntry::chat(
            exchange.id(),
            descriptor.id.clone(),
            descriptor.model.clone(),
            prompt,
            exchange.context_ids(),
            outcome,
        );
        if let Some(error) = error {
            entry = entry.with_error(error);
        }
        self.audit.record(&entry);
    }

    fn emit(&self, event: ExchangeEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped; discarding event");
        }
    }
}

/// Race `future` against cancellation
async fn or_cancel<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, Abort> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Abort::Cancelled),
        output = future => Ok(output),
    }
}

/// Next delta, or `StreamStalled` if the stream stays silent too long
async fn next_delta(
    stream: &mut DeltaStream,
    idle_timeout: Option<Duration>,
) -> ProviderResult<Option<StreamDelta>> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(item) => item.transpose(),
            Err(_) => Err(ProviderError::StreamStalled(limit)),
        },
        None => stream.next().await.transpose(),
    }
}
