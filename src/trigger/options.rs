//! Trigger tunables.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use websocket_trigger::{ExecutionMode, TriggerOptions};
//!
//! let options = TriggerOptions::new()
//!     .with_reconnect_delay(Duration::from_secs(2))
//!     .with_reply_timeout(Duration::from_secs(10))
//!     .with_mode(ExecutionMode::Manual);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Delay between an unexpected close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Maximum time for the TCP/TLS/WebSocket upgrade.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ExecutionMode
// ============================================================================

/// How the host is running the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Regular activation; the host starts the trigger later.
    #[default]
    Trigger,
    /// Interactive test run; the trigger connects during setup.
    Manual,
}

impl ExecutionMode {
    /// Returns `true` if setup should connect immediately.
    #[inline]
    #[must_use]
    pub const fn starts_immediately(self) -> bool {
        matches!(self, Self::Manual)
    }
}

// ============================================================================
// TriggerOptions
// ============================================================================

/// Timing and mode options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOptions {
    /// Flat delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,

    /// Limit for opening the socket.
    pub connect_timeout: Duration,

    /// Limit for `send(data, true)` replies. `None` waits until the socket closes.
    pub reply_timeout: Option<Duration>,

    /// Host execution mode.
    pub mode: ExecutionMode,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reply_timeout: None,
            mode: ExecutionMode::Trigger,
        }
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Sets the reply timeout.
    #[inline]
    #[must_use]
    pub fn with_reply_timeout(mut self, limit: Duration) -> Self {
        self.reply_timeout = Some(limit);
        self
    }

    /// Sets the execution mode.
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
