//! Scripted handshake executor.
//!
//! Runs the operator-supplied open-event script once per successful socket
//! open, before any inbound message is forwarded downstream.
//!
//! # Execution Model
//!
//! 1. A fresh restricted Lua state is created ([`sandbox`])
//! 2. The [`HandshakeContext`] capabilities are installed as globals
//! 3. The script is loaded as a chunk and run on its own watched thread
//! 4. The first of `resolve`, `reject`, completion or a raised error settles
//!    the handshake; the rest of the script is dropped
//!
//! The script may talk over the socket through `send`. A `send(data, true)`
//! consumes the next inbound message; there is no request-id matching, so
//! at most one such wait may be in flight.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | Capability set and the [`HandshakeSocket`] seam |
//! | `sandbox` | Lua state construction and global installation |

// ============================================================================
// Submodules
// ============================================================================

/// Capability set handed to the script.
pub mod context;

/// Restricted Lua state.
pub(crate) mod sandbox;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::{HandshakeContext, HandshakeSocket, Parameters, StaticState};

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use mlua::MultiValue;
use tracing::debug;

use crate::error::{Error, Result};

use sandbox::{Settlement, SettlementSlot};

// ============================================================================
// Constants
// ============================================================================

/// Chunk name reported in script error messages.
const CHUNK_NAME: &str = "open_event";

/// Script used when the host configures none.
///
/// Registers with the remote end using the `accessCode` parameter.
pub const DEFAULT_OPEN_SCRIPT: &str = r#"-- Runs once after the socket opens, before messages are forwarded.
send({ action = "register", accessCode = get_parameter("accessCode") or "" })
"#;

// ============================================================================
// HandshakeExecutor
// ============================================================================

/// Executes the open-event script.
///
/// Cheap to clone; the source is shared.
#[derive(Debug, Clone)]
pub struct HandshakeExecutor {
    /// Lua source of the open-event script.
    source: Arc<str>,
}

impl Default for HandshakeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_SCRIPT)
    }
}

impl HandshakeExecutor {
    /// Creates an executor for the given script source.
    #[inline]
    #[must_use]
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Returns the script source.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the script against `ctx` until it settles.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] on a syntax error or a raised runtime error
    /// - [`Error::HandshakeRejected`] if the script called `reject`
    /// - [`Error::Lua`] if the sandbox itself cannot be built
    pub async fn run(&self, ctx: HandshakeContext) -> Result<()> {
        let lua = sandbox::new_state()?;
        let settlement = Arc::new(SettlementSlot::default());
        sandbox::install(&lua, &ctx, &settlement)?;

        debug!(script_len = self.source.len(), "Running open-event script");

        let chunk = lua
            .load(&*self.source)
            .set_name(CHUNK_NAME)
            .into_function()
            .map_err(|e| Error::handshake(e.to_string()))?;

        let thread = lua.create_thread(chunk)?;
        sandbox::watch(&thread, Arc::clone(&ctx.socket), Arc::clone(&settlement));
        let script = thread.into_async::<MultiValue>(());

        tokio::select! {
            biased;

            explicit = settlement.settled() => settle(explicit),

            outcome = script => match settlement.get() {
                Some(explicit) => settle(explicit),
                None => outcome
                    .map(|_| ())
                    .map_err(|e| Error::handshake(e.to_string())),
            },
        }
    }
}

/// Maps an explicit settlement to the handshake result.
fn settle(settlement: Settlement) -> Result<()> {
    match settlement {
        Settlement::Resolved => Ok(()),
        Settlement::Rejected(reason) => Err(Error::handshake_rejected(reason)),
    }
}

// ============================================================================
// Tests
// ============================================================================
