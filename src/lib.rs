//! WebSocket trigger - Long-lived WebSocket client feeding a workflow host.
//!
//! This library connects to a remote WebSocket endpoint, runs an
//! operator-supplied Lua handshake script once per connection, then decodes
//! every inbound message and hands it to the host's ingestion sink.
//!
//! # Architecture
//!
//! ```text
//!   Host ──manual_trigger/close──► Trigger
//!                                    │
//!                                    ▼
//!                            LifecycleManager ──► HandshakeExecutor (Lua)
//!                                    │                    │
//!                                    ▼                    │ send / wait
//!                               Connection ◄──────────────┘
//!                                    │
//!                                    ▼
//!                              decode() ──► sink
//! ```
//!
//! Key design principles:
//!
//! - At most one live socket per trigger; reconnects build a fresh one
//! - Nothing reaches the sink before the handshake succeeds
//! - `close()` is final: no reconnect follows it
//!
//! # Quick Start
//!
//! ```no_run
//! use websocket_trigger::{Result, Trigger};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let trigger = Trigger::builder()
//!         .endpoint("wss://feed.example.com/stream")
//!         .open_script(r#"send({ action = "subscribe", token = auth.access_token })"#)
//!         .sink(|message| println!("{}", message.into_value()))
//!         .build()?;
//!
//!     // Returns once the handshake settles; streaming continues in the background
//!     trigger.manual_trigger().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     trigger.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handshake`] | Lua open-event script executor |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frames and message decoding |
//! | [`transport`] | Connection and lifecycle manager |
//! | [`trigger`] | Host-facing [`Trigger`] and its builder |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Scripted handshake.
///
/// Runs the open-event script in a restricted Lua state.
pub mod handshake;

/// Type-safe identifiers used in logs.
pub mod identifiers;

/// Wire frames and the message decoder.
pub mod protocol;

/// WebSocket transport layer.
///
/// Socket event loop plus the connect/reconnect supervisor.
pub mod transport;

/// Host-facing trigger, builder and options.
pub mod trigger;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Handshake types
pub use handshake::{DEFAULT_OPEN_SCRIPT, HandshakeExecutor, Parameters, StaticState};

// Identifier types
pub use identifiers::{ConnectionId, TriggerId};

// Protocol types
pub use protocol::{DecodedMessage, decode, decode_text};

// Transport types
pub use transport::LifecycleState;

// Trigger types
pub use trigger::{
    AuthContext, CredentialSource, ExecutionMode, Trigger, TriggerBuilder, TriggerConfig,
    TriggerOptions,
};
