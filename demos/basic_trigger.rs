//! Streams decoded messages from a WebSocket endpoint until Ctrl-C.
//!
//! Demonstrates:
//! - Building a trigger with an endpoint, a parameter and a sink
//! - Running the default open-event script with `manual_trigger`
//! - Shutting down with `close`
//!
//! Usage:
//!   cargo run --example basic_trigger -- wss://feed.example.com/stream
//!   cargo run --example basic_trigger -- ws://127.0.0.1:9001 --debug

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;
use websocket_trigger::{Result, Trigger};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ENDPOINT: &str = "wss://feed.example.com/stream";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    let endpoint = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    let default_filter = if debug { "websocket_trigger=debug" } else { "websocket_trigger=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(endpoint).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(endpoint: String) -> Result<()> {
    println!("=== Basic Trigger: {endpoint} ===\n");

    let trigger = Trigger::builder()
        .endpoint(endpoint)
        .parameter("accessCode", "abc-123")
        .sink(|message| println!("{}", message.into_value()))
        .build()?;

    trigger.manual_trigger().await?;
    println!("[Streaming] Press Ctrl-C to stop\n");

    tokio::signal::ctrl_c().await?;
    trigger.close();
    println!("\n[Closed]");
    Ok(())
}
