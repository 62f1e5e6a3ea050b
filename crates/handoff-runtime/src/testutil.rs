//! Shared fakes for driver tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use handoff_core::sync::PendingPreview;
use handoff_core::{ExecutionMode, SessionEvent, SyncChannel, SyncError};
use handoff_session::SessionFound;

use crate::backend::{AgentBackend, BackendEvent, BackendEventStream, BackendRequest};
use crate::errors::{BackendError, LaunchError};
use crate::launcher::{AgentLauncher, LaunchConfig, LaunchExit};
use crate::prompt::ConfirmPrompt;
use crate::scanner::{ScannerCallbacks, ScannerFactory, TranscriptScanner};

/// Recording sync channel with scriptable pending/discard behavior.
#[derive(Default)]
pub(crate) struct FakeSync {
    pub events: Mutex<Vec<SessionEvent>>,
    pub agent_messages: Mutex<Vec<Value>>,
    pub session_ids: Mutex<Vec<String>>,
    pub keep_alives: Mutex<Vec<ExecutionMode>>,
    pub pending: Mutex<PendingPreview>,
    pub discarded_committed: Mutex<Vec<String>>,
    pub discard_pending_calls: AtomicUsize,
    /// When set, `discard_pending_all` fails with this message.
    pub fail_discard_pending: Mutex<Option<String>>,
    /// When true, `wait_for_metadata_update` reports terminal immediately.
    pub metadata_terminal: Mutex<bool>,
}

#[async_trait]
impl SyncChannel for FakeSync {
    async fn send_agent_message(&self, payload: Value) {
        self.agent_messages.lock().push(payload);
    }

    async fn send_session_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    async fn keep_alive(&self, mode: ExecutionMode) {
        self.keep_alives.lock().push(mode);
    }

    fn update_session_id(&self, session_id: &str) {
        self.session_ids.lock().push(session_id.to_owned());
    }

    async fn discard_pending_all(&self) -> Result<usize, SyncError> {
        let _ = self.discard_pending_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_discard_pending.lock().clone() {
            return Err(SyncError::discard(message));
        }
        let mut pending = self.pending.lock();
        let dropped = pending.count;
        *pending = PendingPreview::default();
        Ok(dropped)
    }

    async fn discard_committed(&self, local_ids: &[String]) -> Result<(), SyncError> {
        self.discarded_committed.lock().extend_from_slice(local_ids);
        Ok(())
    }

    async fn peek_pending_preview(&self, max_preview: usize) -> PendingPreview {
        let pending = self.pending.lock();
        PendingPreview {
            count: pending.count,
            preview: pending.preview.iter().take(max_preview).cloned().collect(),
        }
    }

    async fn pop_pending_message(&self) -> bool {
        false
    }

    async fn wait_for_metadata_update(&self, cancel: CancellationToken) -> bool {
        if *self.metadata_terminal.lock() {
            return false;
        }
        cancel.cancelled().await;
        false
    }
}

/// One scripted launcher behavior.
pub(crate) enum LaunchScript {
    /// Block until the cancellation token fires, then report a cancelled exit.
    BlockUntilCancel,
    /// Exit cleanly right away.
    CleanExit,
    /// Fail with a non-zero exit status.
    FailExit(i32),
}

/// Launcher that records configs and plays back a script.
///
/// When the script runs out it blocks until cancelled.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    pub script: Mutex<VecDeque<LaunchScript>>,
    pub launches: Mutex<Vec<LaunchConfig>>,
}

impl FakeLauncher {
    pub fn scripted(script: Vec<LaunchScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            launches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentLauncher for FakeLauncher {
    async fn launch(
        &self,
        config: LaunchConfig,
        cancel: CancellationToken,
    ) -> Result<LaunchExit, LaunchError> {
        self.launches.lock().push(config);
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(LaunchScript::BlockUntilCancel);
        match step {
            LaunchScript::BlockUntilCancel => {
                cancel.cancelled().await;
                Ok(LaunchExit {
                    exit_code: None,
                    cancelled: true,
                })
            }
            LaunchScript::CleanExit => Ok(LaunchExit {
                exit_code: Some(0),
                cancelled: false,
            }),
            LaunchScript::FailExit(code) => Err(LaunchError::Exited { code }),
        }
    }
}

/// Scanner that records retargets and cleanup.
#[derive(Default)]
pub(crate) struct FakeScanner {
    pub sessions: Mutex<Vec<SessionFound>>,
    pub cleaned_up: AtomicUsize,
}

#[async_trait]
impl TranscriptScanner for FakeScanner {
    fn on_new_session(&self, found: &SessionFound) {
        self.sessions.lock().push(found.clone());
    }

    async fn cleanup(&self) {
        let _ = self.cleaned_up.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out one shared [`FakeScanner`], capturing the callbacks.
#[derive(Default)]
pub(crate) struct FakeScannerFactory {
    pub scanner: Arc<FakeScanner>,
    pub callbacks: Mutex<Option<ScannerCallbacks>>,
}

impl ScannerFactory for FakeScannerFactory {
    fn acquire(&self, callbacks: ScannerCallbacks) -> Arc<dyn TranscriptScanner> {
        *self.callbacks.lock() = Some(callbacks);
        Arc::clone(&self.scanner) as Arc<dyn TranscriptScanner>
    }
}

/// Prompt with a fixed answer.
pub(crate) struct FakePrompt {
    pub answer: bool,
    pub asked: AtomicUsize,
}

impl FakePrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfirmPrompt for FakePrompt {
    async fn confirm(&self, _question: &str, _preview: &[String]) -> bool {
        let _ = self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// One scripted backend behavior.
pub(crate) enum BackendScript {
    /// Yield these events, then end the stream.
    Events(Vec<BackendEvent>),
    /// Fail the query outright.
    Fail(String),
    /// Stream nothing until cancelled, then yield `Cancelled`.
    BlockUntilCancel,
}

/// Backend that records requests and plays back a script.
///
/// When the script runs out it blocks until cancelled.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub script: Mutex<VecDeque<BackendScript>>,
    pub requests: Mutex<Vec<BackendRequest>>,
}

impl FakeBackend {
    pub fn scripted(script: Vec<BackendScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentBackend for FakeBackend {
    async fn query(
        &self,
        request: BackendRequest,
        cancel: CancellationToken,
    ) -> Result<BackendEventStream, BackendError> {
        self.requests.lock().push(request);
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(BackendScript::BlockUntilCancel);
        match step {
            BackendScript::Events(events) => {
                Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
            }
            BackendScript::Fail(message) => Err(BackendError::query(message)),
            BackendScript::BlockUntilCancel => Ok(futures::stream::once(async move {
                cancel.cancelled().await;
                Err(BackendError::Cancelled)
            })
            .boxed()),
        }
    }
}
