//! Error types for the WebSocket trigger.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_trigger::{Result, Trigger};
//!
//! async fn example(trigger: &Trigger) -> Result<()> {
//!     trigger.manual_trigger().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Credentials`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::TriggerClosed`] |
//! | Handshake | [`Error::Handshake`], [`Error::HandshakeRejected`], [`Error::ReplyPending`], [`Error::ReplyTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`], [`Error::Lua`] |
//!
//! Decode errors are absent on purpose: the decoder degrades instead of failing.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when trigger configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Credential resolution error.
    ///
    /// Only produced by [`CredentialSource`](crate::CredentialSource)
    /// implementations; the trigger itself recovers from it.
    #[error("Credential error: {message}")]
    Credentials {
        /// Description of the credential error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket cannot be opened or a frame cannot be written.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout while opening the socket.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The trigger was closed manually.
    ///
    /// Returned by `manual_trigger` after `close`, or when `close` lands
    /// before the first handshake settles.
    #[error("Trigger closed")]
    TriggerClosed,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The open-event script failed to load or raised an error.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Error message from the script.
        message: String,
    },

    /// The open-event script called `reject(reason)`.
    #[error("Handshake rejected: {reason}")]
    HandshakeRejected {
        /// Reason passed to `reject`.
        reason: String,
    },

    /// A reply is already awaited on this connection.
    ///
    /// Replies are correlated by arrival order only, so a second
    /// concurrent wait is refused.
    #[error("A reply is already pending on this connection")]
    ReplyPending,

    /// No reply arrived within the configured timeout.
    #[error("Reply timed out after {timeout_ms}ms")]
    ReplyTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL parse error.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// Lua state setup error.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a credential error.
    #[inline]
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a handshake rejected error.
    #[inline]
    pub fn handshake_rejected(reason: impl Into<String>) -> Self {
        Self::HandshakeRejected {
            reason: reason.into(),
        }
    }

    /// Creates a reply timeout error.
    #[inline]
    pub fn reply_timeout(timeout_ms: u64) -> Self {
        Self::ReplyTimeout { timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ReplyTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came out of the open-event script.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. }
                | Self::HandshakeRejected { .. }
                | Self::ReplyPending
                | Self::ReplyTimeout { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on the next connection attempt.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ReplyTimeout { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
