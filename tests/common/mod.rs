//! Shared fixtures for integration tests.
//!
//! [`MockServer`] is an in-process WebSocket endpoint bound to a random
//! localhost port. It records every text frame it receives, answers through
//! a responder closure, and lets the test push frames or close all sockets.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use websocket_trigger::DecodedMessage;

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test-writer subscriber. `RUST_LOG` controls the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Sink
// ============================================================================

/// Returns a sink closure and the receiver it feeds.
pub fn channel_sink() -> (
    impl Fn(DecodedMessage) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |message: DecodedMessage| {
        let _ = tx.send(message.into_value());
    };
    (sink, rx)
}

/// Receives the next sink message or gives up after `limit`.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<Value>, limit: Duration) -> Option<Value> {
    tokio::time::timeout(limit, rx.recv()).await.ok().flatten()
}

// ============================================================================
// MockServer
// ============================================================================

/// Produces replies for each received text frame.
pub type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Server-initiated action applied to every live socket.
#[derive(Debug, Clone)]
enum Push {
    Text(String),
    Close,
}

/// In-process WebSocket server.
pub struct MockServer {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    accepts: Arc<Mutex<Vec<Instant>>>,
    push_tx: broadcast::Sender<Push>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Binds to a random port and serves with `responder`.
    pub async fn bind(responder: Responder) -> Self {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        debug!(port, "Mock server bound");

        let received = Arc::new(Mutex::new(Vec::new()));
        let accepts = Arc::new(Mutex::new(Vec::new()));
        let (push_tx, _) = broadcast::channel(64);

        let task = tokio::spawn({
            let received = Arc::clone(&received);
            let accepts = Arc::clone(&accepts);
            let push_tx = push_tx.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepts.lock().push(Instant::now());
                    let push_rx = push_tx.subscribe();
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&responder),
                        Arc::clone(&received),
                        push_rx,
                    ));
                }
            }
        });

        Self {
            port,
            received,
            accepts,
            push_tx,
            task,
        }
    }

    /// Echoes every text frame back.
    pub async fn echo() -> Self {
        Self::bind(Arc::new(|text: &str| vec![text.to_owned()])).await
    }

    /// Never answers.
    pub async fn silent() -> Self {
        Self::bind(Arc::new(|_: &str| Vec::new())).await
    }

    /// Returns the `ws://` URL for this server.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns all text frames received so far, across connections.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Returns the number of accepted TCP connections.
    pub fn accept_count(&self) -> usize {
        self.accepts.lock().len()
    }

    /// Returns the instant each connection was accepted.
    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepts.lock().clone()
    }

    /// Sends a text frame on every live socket.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(Push::Text(text.into()));
    }

    /// Closes every live socket with a close frame.
    pub fn close_all(&self) {
        let _ = self.push_tx.send(Push::Close);
    }

    /// Polls until `count` frames were received or `limit` passes.
    pub async fn wait_for_received(&self, count: usize, limit: Duration) -> Vec<String> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline && self.received.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received()
    }

    /// Polls until `count` connections were accepted or `limit` passes.
    pub async fn wait_for_accepts(&self, count: usize, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.accept_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.accept_count() >= count
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serves one socket until either side closes.
async fn serve(
    stream: TcpStream,
    responder: Responder,
    received: Arc<Mutex<Vec<String>>>,
    mut push_rx: broadcast::Receiver<Push>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_owned();
                    received.lock().push(text.clone());
                    for reply in responder(&text) {
                        if ws.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            push = push_rx.recv() => match push {
                Ok(Push::Text(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Push::Close) => {
                    let _ = ws.close(None).await;
                    return;
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            },
        }
    }
}
