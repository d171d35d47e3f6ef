//! Chat Demo - one streaming exchange against a local backend
//!
//! Loads `llmbridge.yaml` (or the path in `LLMBRIDGE_CONFIG`) when present,
//! otherwise talks to Ollama on its default port, and prints every event
//! the session publishes.
//!
//! Run with: cargo run --example chat_demo -- "write fizzbuzz in rust"
//! Use `RUST_LOG=llmbridge_core=debug` to see transport logging.

use anyhow::Context;
use llmbridge_core::config::{self, BridgeConfig};
use llmbridge_core::{ChatSession, ExchangeEvent};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<BridgeConfig> {
    let path = std::env::var("LLMBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("llmbridge.yaml"));

    if path.exists() {
        config::load(&path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(BridgeConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.trim().is_empty() {
        "Reply with the single word: pong".to_string()
    } else {
        prompt
    };

    let config = load_config()?;
    let (session, mut events) = ChatSession::from_config(&config)?;

    let descriptor = session.router().current().descriptor().clone();
    eprintln!("Backend: {} ({}) at {}", descriptor.id, descriptor.model, descriptor.base_url);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = events.recv().await {
            match event {
                ExchangeEvent::Loading => eprintln!("..."),
                ExchangeEvent::StreamingChunk { text, .. } => {
                    let _ = write!(stdout, "{}", text);
                    let _ = stdout.flush();
                }
                ExchangeEvent::StreamingComplete { full_text, .. } => {
                    println!();
                    eprintln!("[{} chars]", full_text.chars().count());
                }
                ExchangeEvent::Error {
                    text,
                    can_retry,
                    correlation_id,
                    ..
                } => {
                    eprintln!("Error: {} (retry: {}, id: {})", text, can_retry, correlation_id);
                }
                _ => {}
            }
        }
    });

    let outcome = session.send_chat(&prompt, Vec::new(), true).await;

    // Closing the sender ends the printer loop
    drop(session);
    printer.await?;

    outcome?;
    Ok(())
}
