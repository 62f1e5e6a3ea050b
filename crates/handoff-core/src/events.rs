//! Session-visible events and transcript entries.
//!
//! [`SessionEvent`] entries are the session's event log: status lines, error
//! reports, and mode-switch markers that both drivers push through the sync
//! channel. [`AgentSessionMessage`] wraps a raw transcript entry as produced
//! by the agent; the payload shape is owned by the agent, not by us.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mode::ExecutionMode;

/// A session-visible event forwarded to the sync channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Informational status line.
    #[serde(rename = "status")]
    Status {
        /// Human-readable message.
        message: String,
    },

    /// Recoverable execution failure (subprocess crash, backend error).
    #[serde(rename = "error")]
    Error {
        /// Human-readable message.
        message: String,
    },

    /// Backend-native event, passed through as-is.
    #[serde(rename = "agentEvent")]
    AgentEvent {
        /// Decoded backend payload.
        payload: Value,
    },

    /// The active execution mode changed.
    #[serde(rename = "switchMode")]
    SwitchMode {
        /// Mode now in control.
        mode: ExecutionMode,
    },

    /// Queued messages were discarded during a switch to local mode.
    #[serde(rename = "messagesDiscarded")]
    MessagesDiscarded {
        /// How many messages were dropped.
        count: usize,
    },
}

/// One transcript entry from the local agent's transcript file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSessionMessage {
    /// Raw entry payload.
    pub payload: Value,
}

impl AgentSessionMessage {
    /// Wrap a raw transcript payload.
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// The entry's `type` discriminator, if present.
    pub fn kind(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Locally synthesized summary entries supersede the backend's own and
    /// must not be forwarded upstream.
    pub fn is_summary(&self) -> bool {
        self.kind() == Some("summary")
    }
}
