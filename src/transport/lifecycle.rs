//! Connection lifecycle manager.
//!
//! Owns the active [`Connection`], drives the handshake, forwards messages
//! once the handshake succeeds, and reconnects after unexpected closes.
//!
//! # State Machine
//!
//! ```text
//!            start
//!   Idle ───────────► Connecting ──open──► Handshaking ──ok──► Streaming
//!    ▲                    │                    │                   │
//!    │                    │ error          reject                  │
//!    │                    │                    ▼                   │
//!    │                    │                 Stalled                │
//!    │                    ▼                    │                   │
//!    │            ReconnectPending ◄───close───┴───────close───────┘
//!    │                    │
//!    │                    └──delay──► Connecting (fresh socket)
//!    │
//!    └──── Closing ◄──── close() from any state
//! ```
//!
//! A rejected handshake does not reconnect by itself: the socket stays open
//! (`Stalled`) and only its close event schedules the next attempt.
//!
//! # Manual Close
//!
//! `close()` sets the manual-close flag before terminating the socket. The
//! flag is checked on every close event and never reset, so no reconnect
//! can follow an intentional shutdown.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::handshake::{HandshakeContext, HandshakeExecutor, Parameters, StaticState};
use crate::identifiers::{ConnectionId, TriggerId};
use crate::protocol::DecodedMessage;
use crate::trigger::{AuthContext, TriggerOptions};

use super::connection::{CloseEvent, CloseSignal, Connection};

// ============================================================================
// Types
// ============================================================================

/// Host ingestion sink.
///
/// Receives every decoded message after the handshake, in arrival order.
pub type EventSink = Arc<dyn Fn(DecodedMessage) + Send + Sync>;

// ============================================================================
// LifecycleState
// ============================================================================

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not started, or fully stopped.
    Idle,
    /// Opening a socket.
    Connecting,
    /// Running the open-event script.
    Handshaking,
    /// Forwarding messages to the sink.
    Streaming,
    /// Handshake rejected; socket open but not forwarding.
    Stalled,
    /// Waiting out the reconnect delay.
    ReconnectPending,
    /// `close()` was called.
    Closing,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Streaming => "streaming",
            Self::Stalled => "stalled",
            Self::ReconnectPending => "reconnect-pending",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LifecycleConfig
// ============================================================================

/// Everything the manager needs, fixed for the trigger's lifetime.
pub(crate) struct LifecycleConfig {
    pub trigger_id: TriggerId,
    pub endpoint: Url,
    pub options: TriggerOptions,
    pub executor: HandshakeExecutor,
    pub auth: AuthContext,
    pub parameters: Arc<Parameters>,
    pub static_state: StaticState,
    pub sink: EventSink,
}

// ============================================================================
// LifecycleManager
// ============================================================================

/// Drives connect → handshake → stream → reconnect cycles.
pub struct LifecycleManager {
    inner: Arc<ManagerInner>,
}

/// Shared state between the manager handle and its supervisor task.
struct ManagerInner {
    config: LifecycleConfig,
    /// The one live connection, replaced wholesale on reconnect.
    active: Mutex<Option<Connection>>,
    /// Set once by `close()`, never cleared.
    manually_closed: AtomicBool,
    state: Mutex<LifecycleState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every `start()`; a supervisor holding an older value is stale.
    generation: AtomicU64,
    /// Wakes a pending connect or reconnect delay. Only `close()` notifies.
    wake: Notify,
    attempts: AtomicU64,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("trigger_id", &self.inner.config.trigger_id)
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LifecycleManager {
    /// Creates an idle manager.
    pub(crate) fn new(config: LifecycleConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                active: Mutex::new(None),
                manually_closed: AtomicBool::new(false),
                state: Mutex::new(LifecycleState::Idle),
                supervisor: Mutex::new(None),
                generation: AtomicU64::new(0),
                wake: Notify::new(),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Starts a fresh cycle and waits for its first handshake to settle.
    ///
    /// Streaming and reconnects continue in the background afterwards.
    /// A cycle that is already running is replaced.
    ///
    /// # Errors
    ///
    /// - [`Error::TriggerClosed`] if `close()` was called
    /// - Connection errors if the first socket cannot be opened
    /// - Handshake errors if the open-event script fails
    pub async fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TriggerClosed);
        }

        let (settled_tx, settled_rx) = oneshot::channel();

        {
            let mut supervisor = self.inner.supervisor.lock();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(previous) = supervisor.take() {
                debug!(trigger_id = %self.inner.config.trigger_id, "Replacing running cycle");
                previous.abort();
                if let Some(connection) = self.inner.active.lock().take() {
                    connection.terminate();
                }
            }
            *supervisor = Some(tokio::spawn(
                Arc::clone(&self.inner).supervise(generation, settled_tx),
            ));
        }

        settled_rx.await.map_err(|_| Error::TriggerClosed)?
    }

    /// Marks the manager closed and terminates the socket.
    ///
    /// Idempotent. Pending handshake operations fail with
    /// [`Error::ConnectionClosed`].
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.manually_closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(trigger_id = %inner.config.trigger_id, "Closing trigger");
        inner.set_state(LifecycleState::Closing);

        if let Some(connection) = inner.active.lock().take() {
            connection.terminate();
        }
        inner.wake.notify_one();

        let running = inner
            .supervisor
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running {
            inner.set_state(LifecycleState::Idle);
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    /// Returns the number of connection attempts so far.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Returns `true` once `close()` was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the ID of the live connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner.active.lock().as_ref().map(Connection::id)
    }
}

// ============================================================================
// Supervisor
// ============================================================================

impl ManagerInner {
    #[inline]
    fn is_closed(&self) -> bool {
        self.manually_closed.load(Ordering::SeqCst)
    }

    /// Returns `true` if closed or superseded by a newer `start()`.
    #[inline]
    fn is_stale(&self, generation: u64) -> bool {
        self.is_closed() || self.generation.load(Ordering::SeqCst) != generation
    }

    /// Records a state unconditionally.
    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(trigger_id = %self.config.trigger_id, from = %*state, to = %next, "State change");
            *state = next;
        }
    }

    /// Records a supervisor transition unless the supervisor is stale.
    ///
    /// The staleness check runs under the state lock, so a concurrent
    /// `close()` always has the last word.
    fn transition(&self, generation: u64, next: LifecycleState) {
        let mut state = self.state.lock();
        if self.is_stale(generation) || *state == next {
            return;
        }
        debug!(trigger_id = %self.config.trigger_id, from = %*state, to = %next, "State change");
        *state = next;
    }

    /// Runs cycles until the manager is closed or the cycle is replaced.
    async fn supervise(self: Arc<Self>, generation: u64, settled_tx: oneshot::Sender<Result<()>>) {
        let mut settled_tx = Some(settled_tx);

        while !self.is_stale(generation) {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

            match self.connect(generation, attempt).await {
                Ok((connection, closed)) => {
                    let outcome = self.handshake(generation, &connection).await;
                    Self::report(&mut settled_tx, outcome);

                    let event = closed.await.unwrap_or(CloseEvent::Dropped);
                    self.release(&connection);
                    info!(
                        trigger_id = %self.config.trigger_id,
                        connection_id = %connection.id(),
                        reason = %event,
                        "Connection closed"
                    );
                }
                Err(e) => {
                    // Unrecoverable errors are louder but still retried until close()
                    if !self.is_stale(generation) && e.is_recoverable() {
                        warn!(
                            trigger_id = %self.config.trigger_id,
                            attempt,
                            error = %e,
                            "Connection attempt failed"
                        );
                    } else if !self.is_stale(generation) {
                        error!(
                            trigger_id = %self.config.trigger_id,
                            attempt,
                            error = %e,
                            recoverable = false,
                            "Connection attempt failed"
                        );
                    }
                    Self::report(&mut settled_tx, Err(e));
                }
            }

            if !self.wait_before_reconnect(generation).await {
                break;
            }
        }

        if self.generation.load(Ordering::SeqCst) == generation {
            self.set_state(LifecycleState::Idle);
        }
        debug!(trigger_id = %self.config.trigger_id, "Supervisor stopped");
    }

    /// Opens a socket and installs it as the live connection.
    async fn connect(&self, generation: u64, attempt: u64) -> Result<(Connection, CloseSignal)> {
        let options = &self.config.options;
        self.transition(generation, LifecycleState::Connecting);
        info!(
            trigger_id = %self.config.trigger_id,
            endpoint = %self.config.endpoint,
            attempt,
            "Connecting"
        );

        let (connection, closed) = tokio::select! {
            opened = Connection::open(
                &self.config.endpoint,
                options.connect_timeout,
                options.reply_timeout,
            ) => opened?,
            () = self.wake.notified() => return Err(Error::TriggerClosed),
        };

        {
            let mut active = self.active.lock();
            if self.generation.load(Ordering::SeqCst) == generation
                && let Some(previous) = active.replace(connection.clone())
            {
                previous.terminate();
            }
        }

        // close() or a newer start() may have run between open and install
        if self.is_stale(generation) {
            connection.terminate();
            self.release(&connection);
            return Err(Error::TriggerClosed);
        }

        info!(
            trigger_id = %self.config.trigger_id,
            connection_id = %connection.id(),
            "Connected"
        );
        Ok((connection, closed))
    }

    /// Runs the open-event script and attaches the listener on success.
    async fn handshake(&self, generation: u64, connection: &Connection) -> Result<()> {
        self.transition(generation, LifecycleState::Handshaking);

        let ctx = HandshakeContext {
            auth: self.config.auth.clone(),
            parameters: Arc::clone(&self.config.parameters),
            static_state: self.config.static_state.clone(),
            socket: Arc::new(connection.clone()),
        };

        if let Err(e) = self.config.executor.run(ctx).await {
            error!(
                trigger_id = %self.config.trigger_id,
                connection_id = %connection.id(),
                error = %e,
                recoverable = e.is_recoverable(),
                "Handshake failed"
            );
            self.transition(generation, LifecycleState::Stalled);
            return Err(e);
        }

        if self.is_stale(generation) {
            return Err(Error::TriggerClosed);
        }

        let sink = Arc::clone(&self.config.sink);
        connection.set_message_handler(Box::new(move |message| sink(message)));
        self.transition(generation, LifecycleState::Streaming);

        info!(
            trigger_id = %self.config.trigger_id,
            connection_id = %connection.id(),
            "Handshake complete, streaming"
        );
        Ok(())
    }

    /// Waits out the reconnect delay. Returns `false` if the supervisor should stop.
    async fn wait_before_reconnect(&self, generation: u64) -> bool {
        if self.is_stale(generation) {
            return false;
        }

        let delay = self.config.options.reconnect_delay;
        self.transition(generation, LifecycleState::ReconnectPending);
        info!(
            trigger_id = %self.config.trigger_id,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after delay"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.wake.notified() => {}
        }

        !self.is_stale(generation)
    }

    /// Clears the slot if it still holds `connection`.
    fn release(&self, connection: &Connection) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|c| c.id() == connection.id()) {
            active.take();
        }
    }

    /// Delivers the first settlement to the `start()` caller.
    ///
    /// Later outcomes belong to background reconnects and are only logged.
    fn report(settled_tx: &mut Option<oneshot::Sender<Result<()>>>, outcome: Result<()>) {
        if let Some(tx) = settled_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use tokio::net::TcpListener;

    fn config(endpoint: Url, options: TriggerOptions) -> LifecycleConfig {
        LifecycleConfig {
            trigger_id: TriggerId::new(),
            endpoint,
            options,
            executor: HandshakeExecutor::new("-- no handshake"),
            auth: AuthContext::default(),
            parameters: Arc::new(Parameters::new()),
            static_state: StaticState::new(),
            sink: Arc::new(|_| {}),
        }
    }

    /// A port with nothing listening on it.
    async fn dead_endpoint() -> Url {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Url::parse(&format!("ws://127.0.0.1:{port}")).unwrap()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::ReconnectPending.to_string(), "reconnect-pending");
        assert_eq!(LifecycleState::Streaming.to_string(), "streaming");
    }

    #[tokio::test]
    async fn test_new_manager_is_idle() {
        let manager = LifecycleManager::new(config(dead_endpoint().await, TriggerOptions::new()));
        assert_eq!(manager.state(), LifecycleState::Idle);
        assert_eq!(manager.attempts(), 0);
        assert!(manager.connection_id().is_none());
    }

    #[tokio::test]
    async fn test_start_after_close_fails() {
        let manager = LifecycleManager::new(config(dead_endpoint().await, TriggerOptions::new()));
        manager.close();
        assert!(manager.is_closed());
        assert_eq!(manager.state(), LifecycleState::Idle);
        assert!(matches!(manager.start().await, Err(Error::TriggerClosed)));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_and_retries() {
        let options = TriggerOptions::new().with_reconnect_delay(Duration::from_millis(20));
        let manager = LifecycleManager::new(config(dead_endpoint().await, options));

        let err = manager.start().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.is_recoverable(), "refused connects are logged as retryable");

        // Keeps retrying in the background
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.attempts() >= 2);
        assert!(!manager.is_closed());

        manager.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let attempts = manager.attempts();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.attempts(), attempts);
        assert_eq!(manager.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_close_wakes_reconnect_delay() {
        let options = TriggerOptions::new().with_reconnect_delay(Duration::from_secs(60));
        let manager = LifecycleManager::new(config(dead_endpoint().await, options));

        assert!(manager.start().await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(), LifecycleState::ReconnectPending);

        manager.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), LifecycleState::Idle);
        assert_eq!(manager.attempts(), 1);
    }
}
