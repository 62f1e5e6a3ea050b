//! Execution and permission modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which executor currently drives the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Locally spawned agent subprocess.
    Local,
    /// Hosted backend driven programmatically.
    Remote,
}

impl ExecutionMode {
    /// Wire name (`local` / `remote`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission setting attached to every user message.
///
/// Persists across mode switches so a relaunch can reapply it, and feeds the
/// queue's coalescing fingerprint: consecutive messages sent under the same
/// mode may be merged into one turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask before every privileged action.
    #[default]
    Default,
    /// Auto-accept file edits.
    AcceptEdits,
    /// Plan mode: read-only exploration.
    Plan,
    /// Skip all permission prompts.
    BypassPermissions,
}

impl PermissionMode {
    /// Wire name, matching the CLI's `--permission-mode` values.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission mode: {0}")]
pub struct ParseModeError(pub String);

impl FromStr for PermissionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(ParseModeError(other.to_owned())),
        }
    }
}
