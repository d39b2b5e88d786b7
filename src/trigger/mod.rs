//! Host-facing trigger.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent configuration and host JSON config |
//! | `core` | [`Trigger`] with `manual_trigger` and `close` |
//! | `credentials` | OAuth2 credential snapshot |
//! | `options` | Timing and execution mode |

// ============================================================================
// Submodules
// ============================================================================

/// Trigger builder and host configuration.
pub mod builder;

/// Trigger lifecycle adapter.
pub mod core;

/// Credential collaborator and snapshot.
pub mod credentials;

/// Tunables.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{TriggerBuilder, TriggerConfig};
pub use self::core::Trigger;
pub use credentials::{AuthContext, CredentialSource};
pub use options::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY, ExecutionMode, TriggerOptions};
