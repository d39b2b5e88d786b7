//! Trigger lifecycle adapter.
//!
//! The host-facing surface: exactly two operations.
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | [`Trigger::manual_trigger`] | One full connect → handshake cycle, awaited until the handshake settles |
//! | [`Trigger::close`] | Marks the trigger closed and terminates the socket |
//!
//! Streaming and reconnects continue in the background after
//! `manual_trigger` returns. Dropping a [`Trigger`] closes it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::info;
use url::Url;

use crate::error::Result;
use crate::identifiers::{ConnectionId, TriggerId};
use crate::transport::lifecycle::LifecycleConfig;
use crate::transport::{LifecycleManager, LifecycleState};

use super::builder::TriggerBuilder;
use super::options::ExecutionMode;

// ============================================================================
// Trigger
// ============================================================================

/// A long-lived WebSocket client trigger.
///
/// Not `Clone`: the trigger owns its background cycle and closes it on drop.
pub struct Trigger {
    id: TriggerId,
    endpoint: Url,
    mode: ExecutionMode,
    manager: LifecycleManager,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.as_str())
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Trigger {
    /// Creates a builder for configuring a trigger.
    #[inline]
    #[must_use]
    pub fn builder() -> TriggerBuilder {
        TriggerBuilder::new()
    }

    pub(crate) fn new(config: LifecycleConfig) -> Self {
        let id = config.trigger_id;
        let endpoint = config.endpoint.clone();
        let mode = config.options.mode;

        info!(trigger_id = %id, endpoint = %endpoint, ?mode, "Trigger created");

        Self {
            id,
            endpoint,
            mode,
            manager: LifecycleManager::new(config),
        }
    }

    /// Connects, runs the handshake, and returns once it settles.
    ///
    /// Calling this while a cycle is running replaces that cycle with a
    /// fresh socket.
    ///
    /// # Errors
    ///
    /// - [`Error::TriggerClosed`](crate::Error::TriggerClosed) after [`close`](Self::close)
    /// - Connection errors if the socket cannot be opened
    /// - Handshake errors if the open-event script fails or rejects
    pub async fn manual_trigger(&self) -> Result<()> {
        info!(trigger_id = %self.id, "Manual trigger");
        self.manager.start().await
    }

    /// Stops the trigger. No reconnect follows. Idempotent.
    pub fn close(&self) {
        self.manager.close();
    }

    /// Returns the trigger ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TriggerId {
        self.id
    }

    /// Returns the validated endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the execution mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.manager.state()
    }

    /// Returns the number of connection attempts so far.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.manager.attempts()
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }

    /// Returns the ID of the live connection, if any.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.manager.connection_id()
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.manager.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
