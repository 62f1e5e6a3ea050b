//! Remote mode driver.
//!
//! Drives the agent through the hosted backend, one queued batch per
//! iteration. Between iterations it parks in the wait coordinator, racing
//! the queue against upstream metadata changes. Cancellation is two-level:
//! `abort` unwinds only the in-flight turn, while `switch` stops the whole
//! loop and hands control to the local driver.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use handoff_core::{ExecutionMode, SessionEvent};
use handoff_rpc::{MethodRegistry, RpcError, SwitchParams};
use handoff_session::{next_message_batch, HookInfo, MessageBatch, Session};

use crate::backend::{AgentBackend, BackendEvent, BackendRequest};
use crate::errors::BackendError;
use crate::types::DriverOutcome;

/// Per-conversation bookkeeping, reset whenever a turn starts from a fresh
/// identity instead of resuming the previous one.
#[derive(Debug, Default)]
struct ConversionState {
    /// How many times the state has been reset.
    resets: u64,
    /// Turn counter within the current conversation.
    turns: u64,
}

impl ConversionState {
    fn reset(&mut self) {
        self.resets += 1;
        self.turns = 0;
    }
}

/// Drives the session through the hosted agent backend.
pub struct RemoteModeDriver {
    session: Arc<Session>,
    registry: Arc<MethodRegistry>,
    backend: Arc<dyn AgentBackend>,
    state: Mutex<ConversionState>,
}

impl RemoteModeDriver {
    /// Build a driver over the shared session and backend.
    pub fn new(
        session: Arc<Session>,
        registry: Arc<MethodRegistry>,
        backend: Arc<dyn AgentBackend>,
    ) -> Self {
        Self {
            session,
            registry,
            backend,
            state: Mutex::new(ConversionState::default()),
        }
    }

    /// Run remote mode until a switch is requested or the upstream store
    /// goes terminal.
    pub async fn run(&self) -> DriverOutcome {
        let stop = CancellationToken::new();
        let current_iter: Arc<Mutex<Option<CancellationToken>>> = Arc::default();

        self.register_handlers(&stop, &current_iter);

        // Session id observed at the end of the previous iteration; `None`
        // until a first iteration has run.
        let mut prior_resolved: Option<Option<String>> = None;

        loop {
            let batch = {
                let sync_pop = Arc::clone(self.session.sync());
                let sync_meta = Arc::clone(self.session.sync());
                next_message_batch(
                    self.session.queue(),
                    &stop,
                    move || {
                        let sync = Arc::clone(&sync_pop);
                        async move { sync.pop_pending_message().await }
                    },
                    move |scope| {
                        let sync = Arc::clone(&sync_meta);
                        async move { sync.wait_for_metadata_update(scope).await }
                    },
                )
                .await
            };
            let Some(batch) = batch else { break };

            self.session.set_last_permission_mode(batch.mode);

            let starting = self.session.session_id();
            // A fresh-start turn gets exactly one conversation reset: either
            // an explicit isolate boundary, or the identity is gone and the
            // previous iteration had actually resolved one.
            let boundary = starting.is_none()
                && prior_resolved.as_ref().map_or(true, |p| p.is_some());
            if batch.isolate || boundary {
                self.state.lock().reset();
            }
            let turn = {
                let mut state = self.state.lock();
                state.turns += 1;
                state.turns
            };

            let iter = stop.child_token();
            *current_iter.lock() = Some(iter.clone());

            let request = self.build_request(&batch);
            debug!(turn, isolate = batch.isolate, "dispatching remote turn");
            self.run_turn(request, iter).await;

            *current_iter.lock() = None;
            prior_resolved = Some(self.session.session_id());
        }

        *current_iter.lock() = None;
        self.registry.reset("abort");
        self.registry.reset("switch");

        debug!("remote driver finished");
        DriverOutcome::Switch
    }

    fn register_handlers(
        &self,
        stop: &CancellationToken,
        current_iter: &Arc<Mutex<Option<CancellationToken>>>,
    ) {
        let iter = Arc::clone(current_iter);
        self.registry.register("abort", move |_params| {
            let iter = Arc::clone(&iter);
            async move {
                let token = iter.lock().clone();
                if let Some(token) = token {
                    info!("aborting in-flight remote turn");
                    token.cancel();
                }
                Ok(serde_json::Value::Null)
            }
        });

        let stop = stop.clone();
        self.registry.register("switch", move |params| {
            let stop = stop.clone();
            async move {
                let params: SwitchParams = match params {
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| RpcError::invalid_params(e.to_string()))?,
                    None => SwitchParams::default(),
                };
                if params.to == Some(ExecutionMode::Remote) {
                    // Already in remote mode.
                    return Ok(json!(false));
                }
                info!("switch to local requested");
                stop.cancel();
                Ok(json!(true))
            }
        });
    }

    fn build_request(&self, batch: &MessageBatch) -> BackendRequest {
        let config = self.session.config();
        BackendRequest {
            message: batch.message.clone(),
            mode: batch.mode,
            isolate: batch.isolate,
            resume: if batch.isolate {
                None
            } else {
                self.session.session_id()
            },
            path: config.path,
            allowed_tools: config.allowed_tools,
        }
    }

    /// Run one turn to completion, cancellation, or error.
    ///
    /// Errors are reported to the session's event log and end only this
    /// turn; the outer loop keeps serving.
    async fn run_turn(&self, request: BackendRequest, cancel: CancellationToken) {
        let sync = Arc::clone(self.session.sync());

        let mut stream = match self.backend.query(request, cancel).await {
            Ok(stream) => stream,
            Err(BackendError::Cancelled) => {
                debug!("remote turn cancelled before streaming");
                return;
            }
            Err(err) => {
                warn!(error = %err, "backend query failed");
                sync.send_session_event(SessionEvent::Error {
                    message: err.to_string(),
                })
                .await;
                return;
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(BackendEvent::SessionStarted {
                    session_id,
                    transcript_path,
                }) => {
                    // Propagate immediately; listeners must not wait for the
                    // turn to finish.
                    self.session
                        .on_session_found(&session_id, Some(&HookInfo { transcript_path }));
                }
                Ok(BackendEvent::Message(payload)) => {
                    sync.send_session_event(SessionEvent::AgentEvent { payload })
                        .await;
                }
                Ok(BackendEvent::Completed) => {
                    debug!("remote turn completed");
                }
                Err(BackendError::Cancelled) => {
                    info!("remote turn aborted");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "remote turn failed mid-stream");
                    sync.send_session_event(SessionEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                    break;
                }
            }
        }
    }
}
