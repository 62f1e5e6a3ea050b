//! Transcript scanner callback contract.
//!
//! The file-system mechanics of tailing the agent's transcript live outside
//! this crate; the drivers only depend on this seam. A scanner is acquired
//! with its output callbacks, retargeted whenever identity is (re)discovered,
//! and released in the driver's cleanup.

use std::sync::Arc;

use async_trait::async_trait;

use handoff_core::AgentSessionMessage;
use handoff_session::SessionFound;

/// Output callbacks supplied at acquisition.
#[derive(Clone)]
pub struct ScannerCallbacks {
    /// Invoked for every transcript entry, in file order.
    pub on_entry: Arc<dyn Fn(AgentSessionMessage) + Send + Sync>,
    /// Invoked when the transcript file is expected but missing.
    pub on_transcript_missing: Arc<dyn Fn() + Send + Sync>,
}

/// A live transcript tail bound to at most one identity at a time.
#[async_trait]
pub trait TranscriptScanner: Send + Sync {
    /// Point the scanner at a newly resolved identity.
    fn on_new_session(&self, found: &SessionFound);

    /// Stop tailing and release resources.
    async fn cleanup(&self);
}

/// Acquires scanners for the local driver.
pub trait ScannerFactory: Send + Sync {
    /// Build a scanner wired to `callbacks`.
    fn acquire(&self, callbacks: ScannerCallbacks) -> Arc<dyn TranscriptScanner>;
}
