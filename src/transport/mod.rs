//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  LifecycleManager    │                         │  Remote         │
//! │    supervisor task   │       WebSocket         │  endpoint       │
//! │    → Connection      │◄───────────────────────►│                 │
//! │      event loop      │     ws:// or wss://     │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - Connect with a timeout, spawn the event loop
//! 2. Handshake script runs over the connection
//! 3. Message handler attached, decoded frames go to the sink
//! 4. Close signal fires, the manager waits and opens a fresh connection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | One socket, its event loop and reply slot |
//! | `lifecycle` | Supervisor state machine and reconnect policy |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Connect, handshake, stream and reconnect supervision.
pub mod lifecycle;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CloseEvent, Connection, MessageHandler};
pub use lifecycle::{EventSink, LifecycleManager, LifecycleState};
