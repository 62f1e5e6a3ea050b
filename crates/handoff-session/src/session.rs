//! Durable cross-driver session state.
//!
//! A [`Session`] is created once per logical session and shared by reference
//! with whichever driver is active. It owns the message queue, the resolved
//! identity (session id + transcript path), the per-spawn launch
//! configuration, and a small ordered pub/sub list of identity-found
//! listeners.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use handoff_core::flags;
use handoff_core::{PermissionMode, SyncChannel};

use crate::queue::MessageQueue;

/// Identity information supplied by a subprocess-side hook.
#[derive(Clone, Debug, Default)]
pub struct HookInfo {
    /// Transcript file location, when the hook knows it.
    pub transcript_path: Option<String>,
}

/// Snapshot passed to identity-found listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionFound {
    /// Newly resolved session id.
    pub session_id: String,
    /// Transcript path, if known at notification time.
    pub transcript_path: Option<String>,
}

/// The (session id, transcript path) pair. Consistent or reset together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// Resolved session id; `None` until discovered.
    pub session_id: Option<String>,
    /// Authoritative transcript location; `None` until reported.
    pub transcript_path: Option<String>,
}

/// Immutable-per-spawn launch configuration.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    /// Working directory for the agent.
    pub path: String,
    /// CLI arguments, including any one-time resume/continue directives.
    pub claude_args: Vec<String>,
    /// Tool allow-list.
    pub allowed_tools: Vec<String>,
    /// MCP server definitions, passed through opaquely.
    pub mcp_servers: HashMap<String, Value>,
    /// Hook settings file injected into local spawns.
    pub hook_settings_path: Option<String>,
}

/// Handle returned by [`Session::add_session_found_callback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackHandle(u64);

type FoundCallback = Arc<dyn Fn(&SessionFound) + Send + Sync>;

/// Durable cross-driver state for one logical session.
pub struct Session {
    identity: Mutex<Identity>,
    config: Mutex<SessionConfig>,
    last_permission_mode: Mutex<PermissionMode>,
    queue: MessageQueue,
    callbacks: Mutex<Vec<(CallbackHandle, FoundCallback)>>,
    next_callback_id: AtomicU64,
    found_notify: Notify,
    sync: Arc<dyn SyncChannel>,
}

impl Session {
    /// Create a session with an empty queue and unresolved identity.
    pub fn new(config: SessionConfig, sync: Arc<dyn SyncChannel>) -> Self {
        Self {
            identity: Mutex::new(Identity::default()),
            config: Mutex::new(config),
            last_permission_mode: Mutex::new(PermissionMode::Default),
            queue: MessageQueue::with_default_fingerprint(),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
            found_notify: Notify::new(),
            sync,
        }
    }

    /// The session's message queue.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Current identity snapshot.
    pub fn identity(&self) -> Identity {
        self.identity.lock().clone()
    }

    /// Current session id, if resolved.
    pub fn session_id(&self) -> Option<String> {
        self.identity.lock().session_id.clone()
    }

    /// Current transcript path, if known.
    pub fn transcript_path(&self) -> Option<String> {
        self.identity.lock().transcript_path.clone()
    }

    /// Record a resolved identity and notify listeners.
    ///
    /// Transcript coupling: a hook-supplied path always wins; without one, an
    /// unchanged id keeps the existing path while a changed id resets it to
    /// `None`, so a new identity never inherits a stale transcript.
    pub fn on_session_found(&self, session_id: &str, hook_info: Option<&HookInfo>) {
        let found = {
            let mut identity = self.identity.lock();
            let changed = identity.session_id.as_deref() != Some(session_id);
            identity.session_id = Some(session_id.to_owned());

            if let Some(path) = hook_info.and_then(|h| h.transcript_path.clone()) {
                identity.transcript_path = Some(path);
            } else if changed {
                identity.transcript_path = None;
            }

            SessionFound {
                session_id: session_id.to_owned(),
                transcript_path: identity.transcript_path.clone(),
            }
        };

        debug!(session_id, transcript = ?found.transcript_path, "session identity resolved");
        self.sync.update_session_id(session_id);

        // Snapshot before notifying: removal during iteration must not skip
        // or duplicate remaining callbacks.
        let callbacks: Vec<FoundCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&found);
        }

        self.found_notify.notify_waiters();
    }

    /// Subscribe to identity-found notifications.
    pub fn add_session_found_callback(
        &self,
        callback: impl Fn(&SessionFound) + Send + Sync + 'static,
    ) -> CallbackHandle {
        let handle = CallbackHandle(self.next_callback_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((handle, Arc::new(callback)));
        handle
    }

    /// Remove a previously registered callback. Unknown handles are ignored.
    pub fn remove_session_found_callback(&self, handle: CallbackHandle) {
        self.callbacks.lock().retain(|(h, _)| *h != handle);
    }

    /// Wait until identity (and transcript path, if required) is known.
    ///
    /// Bounded: resolves at `timeout` regardless, returning whatever identity
    /// is current at that point.
    pub async fn wait_for_session_found(
        &self,
        timeout: Duration,
        require_transcript_path: bool,
    ) -> Identity {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.found_notify.notified();
            let identity = self.identity();
            let satisfied = identity.session_id.is_some()
                && (!require_transcript_path || identity.transcript_path.is_some());
            if satisfied {
                return identity;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, notified).await.is_err()
            {
                return self.identity();
            }
        }
    }

    /// Clear both identity fields.
    ///
    /// Used immediately before a local resume-spawn that is expected to fork
    /// onto a new identity.
    pub fn clear_session_id(&self) {
        let mut identity = self.identity.lock();
        identity.session_id = None;
        identity.transcript_path = None;
    }

    /// Restore a previously captured identity.
    ///
    /// Recovery path for a resume-spawn that failed before the subprocess
    /// reported its new identity: the prior value must come back so the next
    /// driver can still resume it.
    pub fn restore_identity(&self, prior: Identity) {
        *self.identity.lock() = prior;
    }

    /// Remove one-time resume/continue flags from the launch arguments.
    ///
    /// Idempotent after the first call.
    pub fn consume_one_time_flags(&self) {
        let mut config = self.config.lock();
        config.claude_args = flags::consume_one_time_flags(&config.claude_args);
    }

    /// Current CLI arguments (one-time flags included until consumed).
    pub fn claude_args(&self) -> Vec<String> {
        self.config.lock().claude_args.clone()
    }

    /// Per-spawn configuration snapshot.
    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    /// Last externally observed permission mode.
    pub fn last_permission_mode(&self) -> PermissionMode {
        *self.last_permission_mode.lock()
    }

    /// Record the permission mode observed on the latest message.
    pub fn set_last_permission_mode(&self, mode: PermissionMode) {
        *self.last_permission_mode.lock() = mode;
    }

    /// The sync channel this session persists through.
    pub fn sync(&self) -> &Arc<dyn SyncChannel> {
        &self.sync
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity())
            .field("queue_len", &self.queue.len())
            .finish_non_exhaustive()
    }
}
