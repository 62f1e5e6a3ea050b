//! Sync-channel error type.

use thiserror::Error;

/// Errors surfaced by the sync channel collaborator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A discard API call failed. Destructive queue operations must not
    /// proceed past this: the caller aborts the switch-out instead of
    /// silently dropping messages.
    #[error("discard failed: {message}")]
    Discard {
        /// Description from the store.
        message: String,
    },

    /// Generic channel/transport failure.
    #[error("sync channel error: {message}")]
    Channel {
        /// Description.
        message: String,
    },
}

impl SyncError {
    /// Build a [`SyncError::Discard`].
    pub fn discard(message: impl Into<String>) -> Self {
        Self::Discard {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Channel`].
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }
}
