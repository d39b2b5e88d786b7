//! WebSocket connection and event loop.
//!
//! A [`Connection`] wraps exactly one physical socket. Reconnecting never
//! reuses a connection; the lifecycle manager opens a new one.
//!
//! # Event Loop
//!
//! Opening a connection spawns a tokio task that handles:
//!
//! - Outgoing text frames from `send_text` / `send_and_wait`
//! - Incoming frames, decoded and routed in arrival order
//! - Termination on request (abrupt, no closing handshake)
//! - A single [`CloseEvent`] when the socket goes away for any reason
//!
//! # Inbound Routing
//!
//! Each decoded message goes to exactly one place, checked in order:
//!
//! 1. The pending reply of a `send_and_wait`, if any (consumed)
//! 2. The steady-state message handler, if attached
//! 3. Nowhere: messages before the handshake settles are dropped

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::handshake::HandshakeSocket;
use crate::identifiers::ConnectionId;
use crate::protocol::{DecodedMessage, Inbound, RawFrame, decode};

// ============================================================================
// Types
// ============================================================================

/// Client socket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsSink = SplitSink<WsStream, Message>;

/// Steady-state listener callback.
///
/// Called once per inbound message, in arrival order.
pub type MessageHandler = Box<dyn Fn(DecodedMessage) + Send + Sync>;

/// Slot for the one awaited reply.
type ReplySlot = Arc<Mutex<Option<oneshot::Sender<DecodedMessage>>>>;

// ============================================================================
// CloseEvent
// ============================================================================

/// Why the socket went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseEvent {
    /// The remote end sent a close frame.
    Remote {
        /// Close code, if the frame carried one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The stream ended without a close frame.
    Dropped,
    /// A socket-level error ended the stream.
    Failed {
        /// Error description.
        message: String,
    },
    /// [`Connection::terminate`] was called.
    Terminated,
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote {
                code: Some(code),
                reason,
            } => write!(f, "closed by remote ({code}: {reason})"),
            Self::Remote { code: None, .. } => write!(f, "closed by remote"),
            Self::Dropped => write!(f, "stream ended"),
            Self::Failed { message } => write!(f, "socket error: {message}"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Resolves once when the connection's event loop exits.
pub type CloseSignal = oneshot::Receiver<CloseEvent>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write one text frame.
    Send {
        text: String,
        ack_tx: oneshot::Sender<Result<()>>,
    },
    /// Drop the socket without a closing handshake.
    Terminate,
}

// ============================================================================
// Connection
// ============================================================================

/// One physical WebSocket connection.
///
/// Cloning shares the same socket; the lifecycle manager holds the
/// authoritative handle and hands clones to the handshake.
pub struct Connection {
    /// Identifier for logs.
    id: ConnectionId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// One-shot reply slot (shared with event loop).
    pending_reply: ReplySlot,
    /// Steady-state listener (shared with event loop).
    message_handler: Arc<Mutex<Option<MessageHandler>>>,
    /// Maximum wait for a correlated reply.
    reply_timeout: Option<Duration>,
    /// Set by `terminate()` before the event loop notices.
    terminated: Arc<AtomicBool>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            command_tx: self.command_tx.clone(),
            pending_reply: Arc::clone(&self.pending_reply),
            message_handler: Arc::clone(&self.message_handler),
            reply_timeout: self.reply_timeout,
            terminated: Arc::clone(&self.terminated),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("streaming", &self.message_handler.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a socket to `endpoint` and starts its event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the upgrade does not finish in time
    /// - [`Error::Connection`] if the TCP, TLS or WebSocket upgrade fails
    pub async fn open(
        endpoint: &Url,
        connect_timeout: Duration,
        reply_timeout: Option<Duration>,
    ) -> Result<(Self, CloseSignal)> {
        let id = ConnectionId::next();
        debug!(connection_id = %id, endpoint = %endpoint, "Opening WebSocket");

        let (ws_stream, response) =
            timeout(connect_timeout, tokio_tungstenite::connect_async(endpoint.as_str()))
                .await
                .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
                .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        debug!(connection_id = %id, status = %response.status(), "WebSocket open");

        Ok(Self::from_stream(id, ws_stream, reply_timeout))
    }

    /// Wraps an already-open stream and spawns the event loop.
    fn from_stream(
        id: ConnectionId,
        ws_stream: WsStream,
        reply_timeout: Option<Duration>,
    ) -> (Self, CloseSignal) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let pending_reply = ReplySlot::default();
        let message_handler: Arc<Mutex<Option<MessageHandler>>> = Arc::new(Mutex::new(None));

        tokio::spawn(Self::run_event_loop(
            id,
            ws_stream,
            command_rx,
            Arc::clone(&pending_reply),
            Arc::clone(&message_handler),
            close_tx,
        ));

        let connection = Self {
            id,
            command_tx,
            pending_reply,
            message_handler,
            reply_timeout,
            terminated: Arc::new(AtomicBool::new(false)),
        };

        (connection, close_rx)
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.command_tx.is_closed()
    }

    /// Attaches the steady-state listener.
    ///
    /// Messages that arrived before this call are not replayed.
    pub fn set_message_handler(&self, handler: MessageHandler) {
        *self.message_handler.lock() = Some(handler);
    }

    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is gone
    /// - [`Error::Connection`] if the write fails
    pub async fn send_text(&self, text: String) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send { text, ack_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Writes one text frame and waits for the next inbound message.
    ///
    /// The reply slot is registered before the frame is written, so a fast
    /// reply cannot slip past to the steady-state listener.
    ///
    /// # Errors
    ///
    /// - [`Error::ReplyPending`] if another wait is in flight
    /// - [`Error::ReplyTimeout`] if the configured reply timeout elapses
    /// - [`Error::ConnectionClosed`] if the socket goes away first
    pub async fn send_and_wait(&self, text: String) -> Result<DecodedMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut slot = self.pending_reply.lock();
            if slot.is_some() {
                warn!(connection_id = %self.id, "Reply already pending");
                return Err(Error::ReplyPending);
            }
            *slot = Some(reply_tx);
        }

        if let Err(e) = self.send_text(text).await {
            self.pending_reply.lock().take();
            return Err(e);
        }

        let reply = match self.reply_timeout {
            Some(limit) => match timeout(limit, reply_rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending_reply.lock().take();
                    return Err(Error::reply_timeout(limit.as_millis() as u64));
                }
            },
            None => reply_rx.await,
        };

        reply.map_err(|_| Error::ConnectionClosed)
    }

    /// Drops the socket immediately, without a closing handshake.
    ///
    /// Idempotent. The close signal still fires, with
    /// [`CloseEvent::Terminated`].
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(ConnectionCommand::Terminate);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        id: ConnectionId,
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        pending_reply: ReplySlot,
        message_handler: Arc<Mutex<Option<MessageHandler>>>,
        close_tx: oneshot::Sender<CloseEvent>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let close_event = loop {
            tokio::select! {
                // Incoming frames
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let frame = RawFrame::Text(text.as_str().to_owned());
                            Self::handle_incoming_frame(id, frame, &pending_reply, &message_handler);
                        }

                        Some(Ok(Message::Binary(bytes))) => {
                            let frame = RawFrame::Binary(bytes.to_vec());
                            Self::handle_incoming_frame(id, frame, &pending_reply, &message_handler);
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(connection_id = %id, "WebSocket closed by remote");
                            break match frame {
                                Some(frame) => CloseEvent::Remote {
                                    code: Some(u16::from(frame.code)),
                                    reason: frame.reason.as_str().to_owned(),
                                },
                                None => CloseEvent::Remote { code: None, reason: String::new() },
                            };
                        }

                        Some(Err(e)) => {
                            warn!(connection_id = %id, error = %e, "WebSocket error");
                            break CloseEvent::Failed { message: e.to_string() };
                        }

                        None => {
                            debug!(connection_id = %id, "WebSocket stream ended");
                            break CloseEvent::Dropped;
                        }

                        // Ping/Pong are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the handshake and lifecycle manager
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { text, ack_tx }) => {
                            let result = Self::write_text(&mut ws_write, text).await;
                            if let Err(ref e) = result {
                                warn!(connection_id = %id, error = %e, "Failed to write frame");
                            }
                            let _ = ack_tx.send(result);
                        }

                        Some(ConnectionCommand::Terminate) => {
                            debug!(connection_id = %id, "Terminating WebSocket");
                            break CloseEvent::Terminated;
                        }

                        None => {
                            debug!(connection_id = %id, "All handles dropped");
                            break CloseEvent::Terminated;
                        }
                    }
                }
            }
        };

        // Queued sends and the awaited reply fail with ConnectionClosed
        command_rx.close();
        pending_reply.lock().take();
        message_handler.lock().take();

        debug!(connection_id = %id, reason = %close_event, "Event loop terminated");
        let _ = close_tx.send(close_event);
    }

    /// Decodes one frame and routes it.
    fn handle_incoming_frame(
        id: ConnectionId,
        frame: RawFrame,
        pending_reply: &ReplySlot,
        message_handler: &Arc<Mutex<Option<MessageHandler>>>,
    ) {
        trace!(connection_id = %id, len = frame.len(), "Frame received");
        let decoded = decode(&Inbound::Frame(frame));

        let reply_tx = pending_reply.lock().take();
        if let Some(reply_tx) = reply_tx {
            // Waiter may have timed out in the meantime
            if let Err(decoded) = reply_tx.send(decoded) {
                Self::dispatch(id, decoded, message_handler);
            }
            return;
        }

        Self::dispatch(id, decoded, message_handler);
    }

    /// Hands a message to the steady-state listener, if attached.
    fn dispatch(
        id: ConnectionId,
        decoded: DecodedMessage,
        message_handler: &Arc<Mutex<Option<MessageHandler>>>,
    ) {
        let handler = message_handler.lock();
        match *handler {
            Some(ref handler) => handler(decoded),
            None => trace!(connection_id = %id, "Message before handshake settled, dropped"),
        }
    }

    /// Writes one text frame to the socket.
    async fn write_text(ws_write: &mut WsSink, text: String) -> Result<()> {
        ws_write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::connection(e.to_string()))
    }
}

// ============================================================================
// HandshakeSocket
// ============================================================================

#[async_trait]
impl HandshakeSocket for Connection {
    async fn send_text(&self, text: String) -> Result<()> {
        Connection::send_text(self, text).await
    }

    async fn send_and_wait(&self, text: String) -> Result<DecodedMessage> {
        Connection::send_and_wait(self, text).await
    }

    fn is_open(&self) -> bool {
        Connection::is_open(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
