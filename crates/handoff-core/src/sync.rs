//! Sync-channel collaborator trait.
//!
//! The encrypted remote store is out of scope; this trait is the seam the
//! drivers and the session talk to. A real implementation relays to the
//! hosted store; tests use in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::SyncError;
use crate::events::SessionEvent;
use crate::mode::ExecutionMode;

/// Preview of the upstream pending-message queue, used only for the
/// discard-confirmation prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingPreview {
    /// Total pending entries upstream.
    pub count: usize,
    /// First few message bodies, for display.
    pub preview: Vec<String>,
}

/// Channel to the remote store shared by all devices on the session.
#[async_trait]
pub trait SyncChannel: Send + Sync {
    /// Forward one transcript entry from the local agent.
    async fn send_agent_message(&self, payload: Value);

    /// Append an entry to the session's event log.
    async fn send_session_event(&self, event: SessionEvent);

    /// Report liveness and the currently active execution mode.
    async fn keep_alive(&self, mode: ExecutionMode);

    /// Persist the resolved agent session id into session metadata.
    ///
    /// Fire-and-forget: called synchronously from identity-found
    /// notification, so implementations must not block.
    fn update_session_id(&self, session_id: &str);

    /// Discard every not-yet-committed pending message upstream.
    ///
    /// Returns how many entries were dropped.
    async fn discard_pending_all(&self) -> Result<usize, SyncError>;

    /// Mark already-committed queued messages as discarded, so other devices
    /// stop displaying them as in flight.
    async fn discard_committed(&self, local_ids: &[String]) -> Result<(), SyncError>;

    /// Peek at the upstream pending queue without consuming it.
    async fn peek_pending_preview(&self, max_preview: usize) -> PendingPreview;

    /// Try to materialize one upstream pending message into the local queue.
    ///
    /// Best-effort; the boolean only reports whether anything was moved.
    async fn pop_pending_message(&self) -> bool;

    /// Suspend until session metadata changes upstream or `cancel` fires.
    ///
    /// Returns `true` for a live update and `false` for a terminal or
    /// cancelled condition.
    async fn wait_for_metadata_update(&self, cancel: CancellationToken) -> bool;
}
