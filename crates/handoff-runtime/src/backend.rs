//! Backend call abstraction.
//!
//! One seam for "run the agent on this input": the hosted programmatic
//! backend implements it for remote mode, and tests implement it with
//! scripted streams. The future resolves to an event stream; identity
//! discovery arrives in-band as [`BackendEvent::SessionStarted`] and must be
//! propagated to listeners immediately, without waiting on any file-system
//! confirmation of the transcript.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use handoff_core::PermissionMode;

use crate::errors::BackendError;

/// Boxed stream of backend-native events.
pub type BackendEventStream =
    Pin<Box<dyn Stream<Item = Result<BackendEvent, BackendError>> + Send>>;

/// One turn's worth of input for the backend.
#[derive(Clone, Debug)]
pub struct BackendRequest {
    /// Newline-joined user message batch.
    pub message: String,
    /// Permission mode to run the turn under.
    pub mode: PermissionMode,
    /// Context-reset boundary: start fresh instead of resuming.
    pub isolate: bool,
    /// Session id to resume, when known and not isolating.
    pub resume: Option<String>,
    /// Working directory.
    pub path: String,
    /// Tool allow-list.
    pub allowed_tools: Vec<String>,
}

/// Decoded backend-native events.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendEvent {
    /// The backend resolved (or forked) the session identity.
    SessionStarted {
        /// Resolved session id.
        session_id: String,
        /// Transcript location, if the backend reports one.
        transcript_path: Option<String>,
    },
    /// An opaque agent event to append to the session's event log.
    Message(Value),
    /// The turn finished.
    Completed,
}

/// The hosted/programmatic agent backend.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Run one turn, streaming events as they arrive.
    ///
    /// Cancelling `cancel` must unwind the in-flight call promptly; the
    /// stream then ends (or yields [`BackendError::Cancelled`]).
    async fn query(
        &self,
        request: BackendRequest,
        cancel: CancellationToken,
    ) -> Result<BackendEventStream, BackendError>;
}
