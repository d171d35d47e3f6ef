//! Audit trail for finished exchanges
//!
//! The session hands one [`AuditEntry`] per completed, failed or cancelled
//! exchange to an [`AuditSink`]. Recording is best-effort: a sink never fails
//! the exchange it describes.

use crate::config::AuditConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Number of prompt characters kept in an entry
pub const PROMPT_PREVIEW_CHARS: usize = 200;

/// How an exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Always `"chat"` for exchanges
    pub kind: String,
    pub exchange_id: Uuid,
    /// Backend identity string
    pub backend: String,
    pub model: String,
    /// First [`PROMPT_PREVIEW_CHARS`] characters of the user text
    pub prompt_preview: String,
    /// Context identifiers referenced by the exchange
    pub context_ids: Vec<String>,
    /// Serialized as RFC 3339
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    /// Failure detail, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    /// Entry for a chat exchange, timestamped now
    pub fn chat(
        exchange_id: Uuid,
        backend: impl Into<String>,
        model: impl Into<String>,
        prompt: &str,
        context_ids: &[String],
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            kind: "chat".to_string(),
            exchange_id,
            backend: backend.into(),
            model: model.into(),
            prompt_preview: prompt_preview(prompt),
            context_ids: context_ids.to_vec(),
            timestamp: Utc::now(),
            outcome,
            error: None,
        }
    }

    /// Attach failure detail
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Truncate on a character boundary
pub fn prompt_preview(prompt: &str) -> String {
    prompt.chars().take(PROMPT_PREVIEW_CHARS).collect()
}

/// Receives audit entries
pub trait AuditSink: Send + Sync {
    /// Record one entry; failures are logged, never returned
    fn record(&self, entry: &AuditEntry);
}

/// Sink used when auditing is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _entry: &AuditEntry) {}
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    // Serializes appends from concurrent sessions sharing one log
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, entry: &AuditEntry) {
        match self.append(entry) {
            Ok(()) => debug!(exchange_id = %entry.exchange_id, "Audit entry recorded"),
            Err(e) => warn!(path = %self.path.display(), "Audit log write failed: {}", e),
        }
    }
}

/// Build the sink described by configuration
pub fn sink_from_config(config: &AuditConfig) -> Arc<dyn AuditSink> {
    match (&config.path, config.enabled) {
        (Some(path), true) => Arc::new(JsonlAuditLog::new(path.clone())),
        _ => Arc::new(NoopAudit),
    }
}
