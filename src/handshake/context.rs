//! Capabilities handed to the open-event script.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::protocol::DecodedMessage;
use crate::trigger::AuthContext;

// ============================================================================
// HandshakeSocket
// ============================================================================

/// The socket operations a handshake may perform.
///
/// Implemented by [`Connection`](crate::transport::Connection); tests
/// substitute in-memory fakes.
#[async_trait]
pub trait HandshakeSocket: Send + Sync {
    /// Writes one text frame.
    async fn send_text(&self, text: String) -> Result<()>;

    /// Writes one text frame and returns the decoded next inbound message.
    ///
    /// The returned message is consumed: the steady-state listener never
    /// sees it.
    async fn send_and_wait(&self, text: String) -> Result<DecodedMessage>;

    /// Returns `false` once the socket was terminated or closed.
    ///
    /// A running script is aborted when this turns `false`.
    fn is_open(&self) -> bool {
        true
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Host-supplied node parameters, read-only to the script.
pub type Parameters = Map<String, Value>;

// ============================================================================
// StaticState
// ============================================================================

/// Per-trigger state shared by every handshake of the same trigger.
///
/// Survives reconnects. Cloning shares the same underlying map.
#[derive(Clone, Default)]
pub struct StaticState {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl StaticState {
    /// Creates an empty state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state seeded with initial values.
    #[must_use]
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(values)),
        }
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    /// Stores `value` under `key`. Storing `null` removes the key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut guard = self.inner.lock();
        if value.is_null() {
            guard.shift_remove(&key);
        } else {
            guard.insert(key, value);
        }
    }

    /// Returns a copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().clone()
    }
}

impl fmt::Debug for StaticState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticState")
            .field("keys", &self.inner.lock().len())
            .finish()
    }
}

// ============================================================================
// HandshakeContext
// ============================================================================

/// Everything the open-event script can reach.
///
/// Built fresh for every connection attempt and dropped once the
/// handshake settles.
#[derive(Clone)]
pub struct HandshakeContext {
    /// Credential snapshot taken at startup.
    pub auth: AuthContext,
    /// Host parameters.
    pub parameters: Arc<Parameters>,
    /// Static state of the owning trigger.
    pub static_state: StaticState,
    /// The socket of the current attempt.
    pub socket: Arc<dyn HandshakeSocket>,
}

impl fmt::Debug for HandshakeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeContext")
            .field("auth", &self.auth)
            .field("parameters", &self.parameters.len())
            .field("static_state", &self.static_state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
