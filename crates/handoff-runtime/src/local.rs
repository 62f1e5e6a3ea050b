//! Local mode driver.
//!
//! Owns the session while the user drives the agent through a local terminal
//! subprocess. Responsibilities:
//!
//! - pre-flight: confirm and discard any queued/pending remote messages
//!   before taking over (declining aborts the switch-in)
//! - spawn/supervise the subprocess, retrying on failure until a stop reason
//!   is decided
//! - forward transcript entries upstream through the scanner seam
//! - serve `abort`/`switch` RPCs and hand control back when new remote input
//!   arrives
//!
//! Cleanup is unconditional: handlers are disarmed, the queue callback is
//! removed, and the scanner is released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use handoff_core::flags;
use handoff_core::{ExecutionMode, SessionEvent};
use handoff_rpc::{MethodRegistry, RpcError, SwitchParams};
use handoff_session::{Session, SessionFound};

use crate::launcher::{AgentLauncher, LaunchConfig};
use crate::prompt::ConfirmPrompt;
use crate::scanner::{ScannerCallbacks, ScannerFactory};
use crate::types::DriverOutcome;

/// How long a stop sequence waits for the forked identity before tearing
/// down anyway.
const IDENTITY_WAIT: Duration = Duration::from_secs(10);
/// Delay between respawn attempts after a subprocess failure.
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// How many pending messages to show in the discard confirmation.
const DISCARD_PREVIEW_LEN: usize = 3;

const DISCARD_QUESTION: &str = "Discard these messages and switch to local mode? (y/N)";

/// Shared stop state for one driver run.
///
/// `reason` is decided exactly once; `kill` terminates the current
/// subprocess; `exited` fires when the driver's cleanup has completed, which
/// is what stop callers await.
struct Stopper {
    reason: Mutex<Option<DriverOutcome>>,
    kill: CancellationToken,
    exited: CancellationToken,
}

impl Stopper {
    fn new() -> Self {
        Self {
            reason: Mutex::new(None),
            kill: CancellationToken::new(),
            exited: CancellationToken::new(),
        }
    }

    /// Record `outcome` unless a reason was already decided.
    fn decide(&self, outcome: DriverOutcome) {
        let mut reason = self.reason.lock();
        if reason.is_none() {
            *reason = Some(outcome);
        }
    }

    fn decided(&self) -> Option<DriverOutcome> {
        *self.reason.lock()
    }

    /// Stop the subprocess and wait for the driver to finish cleanup.
    ///
    /// If identity is still unresolved, first gives the subprocess a bounded
    /// window to report it, so the next driver can resume the forked session.
    async fn stop_and_wait(&self, session: &Session) {
        if session.session_id().is_none() {
            let _ = session
                .wait_for_session_found(IDENTITY_WAIT, false)
                .await;
        }
        self.decide(DriverOutcome::Switch);
        self.kill.cancel();
        self.exited.cancelled().await;
    }
}

/// Drives the session through a locally spawned agent subprocess.
pub struct LocalModeDriver {
    session: Arc<Session>,
    registry: Arc<MethodRegistry>,
    launcher: Arc<dyn AgentLauncher>,
    scanners: Arc<dyn ScannerFactory>,
    prompt: Arc<dyn ConfirmPrompt>,
    program: String,
}

impl LocalModeDriver {
    /// Build a driver over the shared session and collaborators.
    pub fn new(
        session: Arc<Session>,
        registry: Arc<MethodRegistry>,
        launcher: Arc<dyn AgentLauncher>,
        scanners: Arc<dyn ScannerFactory>,
        prompt: Arc<dyn ConfirmPrompt>,
    ) -> Self {
        Self {
            session,
            registry,
            launcher,
            scanners,
            prompt,
            program: "claude".into(),
        }
    }

    /// Override the agent binary name.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run local mode until a stop reason is decided.
    pub async fn run(&self) -> DriverOutcome {
        let stopper = Arc::new(Stopper::new());

        // Entries are forwarded through one channel drained by a single
        // task, so they reach the sync channel in file order. The task ends
        // on its own once the scanner (the only sender) is released.
        let (entry_tx, mut entry_rx) =
            tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
        {
            let sync = Arc::clone(self.session.sync());
            let _ = tokio::spawn(async move {
                while let Some(payload) = entry_rx.recv().await {
                    sync.send_agent_message(payload).await;
                }
            });
        }

        let scanner = self.scanners.acquire(ScannerCallbacks {
            on_entry: Arc::new(move |entry: handoff_core::AgentSessionMessage| {
                if entry.is_summary() {
                    // Locally synthesized summaries supersede upstream
                    // ones; never forward them.
                    return;
                }
                let _ = entry_tx.send(entry.payload);
            }),
            on_transcript_missing: Arc::new(|| {
                warn!("transcript file missing while scanning");
            }),
        });

        // Every identity discovered from here on retargets the scanner.
        let scanner_handle = {
            let scanner = Arc::clone(&scanner);
            self.session
                .add_session_found_callback(move |found| scanner.on_new_session(found))
        };
        if let Some(session_id) = self.session.session_id() {
            scanner.on_new_session(&SessionFound {
                session_id,
                transcript_path: self.session.transcript_path(),
            });
        }

        self.register_handlers(&stopper);
        self.register_queue_callback(&stopper);

        let outcome = if self.confirm_discard().await {
            self.spawn_loop(&stopper).await
        } else {
            DriverOutcome::Switch
        };

        // Unconditional cleanup. Unblocking stop waiters comes first so an
        // in-flight abort/switch call returns as soon as the subprocess is
        // gone.
        stopper.exited.cancel();
        self.registry.reset("abort");
        self.registry.reset("switch");
        self.session.queue().set_on_message(None);
        self.session.remove_session_found_callback(scanner_handle);
        scanner.cleanup().await;

        debug!(outcome = outcome.as_str(), "local driver finished");
        outcome
    }

    fn register_handlers(&self, stopper: &Arc<Stopper>) {
        let session = Arc::clone(&self.session);
        let st = Arc::clone(stopper);
        self.registry.register("abort", move |_params| {
            let session = Arc::clone(&session);
            let st = Arc::clone(&st);
            async move {
                info!("abort requested in local mode");
                // Aborted input must not be replayed after the switch:
                // drop the queue (and its upstream bookkeeping) before the
                // subprocess comes down.
                let local_ids = session.queue().committed_local_ids();
                session.queue().reset();
                if !local_ids.is_empty() {
                    if let Err(e) = session.sync().discard_committed(&local_ids).await {
                        warn!(error = %e, "failed to discard committed messages on abort");
                    }
                }
                st.stop_and_wait(&session).await;
                Ok(serde_json::Value::Null)
            }
        });

        let session = Arc::clone(&self.session);
        let st = Arc::clone(stopper);
        self.registry.register("switch", move |params| {
            let session = Arc::clone(&session);
            let st = Arc::clone(&st);
            async move {
                let params: SwitchParams = match params {
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| RpcError::invalid_params(e.to_string()))?,
                    None => SwitchParams::default(),
                };
                if params.to == Some(ExecutionMode::Local) {
                    // Already in local mode.
                    return Ok(json!(false));
                }
                info!("switch to remote requested");
                st.stop_and_wait(&session).await;
                Ok(json!(true))
            }
        });
    }

    /// New remote input while local mode is active hands control back: the
    /// message stays queued and the remote driver picks it up after the
    /// switch.
    fn register_queue_callback(&self, stopper: &Arc<Stopper>) {
        let session = Arc::clone(&self.session);
        let st = Arc::clone(stopper);
        self.session.queue().set_on_message(Some(Arc::new(
            move |_message: &str, mode| {
                session.set_last_permission_mode(mode);
                let session = Arc::clone(&session);
                let st = Arc::clone(&st);
                let _ = tokio::spawn(async move {
                    st.stop_and_wait(&session).await;
                });
            },
        )));
    }

    /// Pre-flight: queued/pending remote messages must be explicitly
    /// discarded before local mode takes over. Returns `false` if the
    /// takeover should be aborted.
    async fn confirm_discard(&self) -> bool {
        let sync = self.session.sync();
        let queue = self.session.queue();

        let pending = sync.peek_pending_preview(DISCARD_PREVIEW_LEN).await;
        if queue.is_empty() && pending.count == 0 {
            return true;
        }

        if !self.prompt.confirm(DISCARD_QUESTION, &pending.preview).await {
            info!("discard declined, staying out of local mode");
            return false;
        }

        let dropped_pending = match sync.discard_pending_all().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "failed to discard pending messages");
                sync.send_session_event(SessionEvent::Error {
                    message: format!("failed to discard pending messages: {e}"),
                })
                .await;
                return false;
            }
        };

        let local_ids = queue.committed_local_ids();
        if !local_ids.is_empty() {
            if let Err(e) = sync.discard_committed(&local_ids).await {
                warn!(error = %e, "failed to discard committed messages");
                sync.send_session_event(SessionEvent::Error {
                    message: format!("failed to discard committed messages: {e}"),
                })
                .await;
                return false;
            }
        }

        let dropped_local = queue.len();
        queue.reset();

        let count = dropped_local + dropped_pending;
        info!(count, "discarded queued messages for local takeover");
        sync.send_session_event(SessionEvent::MessagesDiscarded { count })
            .await;
        true
    }

    /// Spawn/supervise cycles until a stop reason is decided.
    async fn spawn_loop(&self, stopper: &Arc<Stopper>) -> DriverOutcome {
        loop {
            if let Some(reason) = stopper.decided() {
                return reason;
            }

            let prior = self.session.identity();
            let resuming = prior.session_id.is_some();
            if resuming {
                // A resume-spawn forks onto a new identity. Clear the old
                // one so nothing resumes the stale pre-fork id while the
                // subprocess is still starting up.
                self.session.clear_session_id();
            }

            let mode = self.session.last_permission_mode();
            let config = self.launch_config(mode);
            debug!(resuming, mode = mode.as_str(), "spawning local agent");
            let result = self
                .launcher
                .launch(config, stopper.kill.clone())
                .await;

            // Resume/continue directives apply to the first attempt only.
            self.session.consume_one_time_flags();

            if resuming && self.session.session_id().is_none() {
                // The subprocess went away before reporting its forked
                // identity. Put the known-good one back so the next driver
                // can still resume it.
                self.session.restore_identity(prior);
            }

            match result {
                Ok(exit) => {
                    if exit.cancelled {
                        stopper.decide(DriverOutcome::Switch);
                    } else {
                        stopper.decide(DriverOutcome::Exit);
                    }
                    return stopper.decided().unwrap_or(DriverOutcome::Exit);
                }
                Err(err) => {
                    if let Some(reason) = stopper.decided() {
                        return reason;
                    }
                    warn!(error = %err, "local agent failed, retrying");
                    self.session
                        .sync()
                        .send_session_event(SessionEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                    tokio::select! {
                        () = tokio::time::sleep(RETRY_DELAY) => {}
                        () = stopper.kill.cancelled() => {}
                    }
                }
            }
        }
    }

    fn launch_config(&self, mode: handoff_core::PermissionMode) -> LaunchConfig {
        let config = self.session.config();
        LaunchConfig {
            program: self.program.clone(),
            args: flags::apply_permission_flags(&config.claude_args, mode),
            cwd: config.path,
            env: std::collections::HashMap::new(),
            allowed_tools: config.allowed_tools,
            settings_path: config.hook_settings_path,
        }
    }
}
