//! Driver-facing error types.
//!
//! Both are recoverable by design: the owning driver reports them to the
//! session's event log and retries unless a stop reason is already decided.
//! Nothing here propagates as a fatal crash past a driver.

use thiserror::Error;

/// Local subprocess launch/supervision failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The process could not be spawned at all.
    #[error("failed to spawn agent process: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the spawned process failed.
    #[error("agent process wait failed: {source}")]
    Wait {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("agent process exited with status {code}")]
    Exited {
        /// Exit code (or -1 when killed by signal).
        code: i32,
    },
}

/// Remote backend query failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The query was cancelled through its cancellation scope.
    #[error("backend query cancelled")]
    Cancelled,

    /// The backend rejected or failed the query.
    #[error("backend error: {message}")]
    Query {
        /// Description from the backend.
        message: String,
    },

    /// The event stream broke mid-turn.
    #[error("backend stream error: {message}")]
    Stream {
        /// Description.
        message: String,
    },
}

impl BackendError {
    /// Build a [`BackendError::Query`].
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Build a [`BackendError::Stream`].
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }
}
