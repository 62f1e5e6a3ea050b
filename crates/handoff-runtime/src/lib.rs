//! # handoff-runtime
//!
//! The mode-switching orchestration layer:
//!
//! - [`LocalModeDriver`]: supervises one locally spawned agent subprocess
//!   per spawn cycle: transcript forwarding, abort/switch RPC handlers, the
//!   resume-fork identity handling, and crash retry.
//! - [`RemoteModeDriver`]: drives the same agent through a hosted backend,
//!   one queue batch per iteration, with per-iteration cancellation scopes.
//! - [`run_supervisor`]: the explicit two-state machine that alternates the
//!   drivers; at most one driver is active per session by construction.
//! - Collaborator seams: [`AgentLauncher`] (subprocess), [`AgentBackend`]
//!   (hosted query), [`ScannerFactory`] (transcript file watcher), and
//!   [`ConfirmPrompt`] (interactive discard confirmation).

#![deny(unsafe_code)]

pub mod backend;
pub mod errors;
pub mod launcher;
pub mod local;
pub mod prompt;
pub mod remote;
pub mod scanner;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{AgentBackend, BackendEvent, BackendEventStream, BackendRequest};
pub use errors::{BackendError, LaunchError};
pub use launcher::{AgentLauncher, ClaudeLauncher, LaunchConfig, LaunchExit};
pub use local::LocalModeDriver;
pub use prompt::{ConfirmPrompt, TerminalPrompt};
pub use remote::RemoteModeDriver;
pub use scanner::{ScannerCallbacks, ScannerFactory, TranscriptScanner};
pub use supervisor::{run_supervisor, SupervisorDeps};
pub use types::DriverOutcome;
