//! # handoff-core
//!
//! Foundation types and shared vocabulary for the Handoff dual-mode agent
//! bridge:
//!
//! - **Modes**: [`ExecutionMode`] (local subprocess vs. remote backend) and
//!   [`PermissionMode`] (the per-message permission setting that drives
//!   native CLI launch flags and queue coalescing).
//! - **Launch flags**: permission-flag injection and one-time resume flag
//!   consumption in [`flags`].
//! - **Events**: [`SessionEvent`] session-log entries and
//!   [`AgentSessionMessage`] transcript entries in [`events`].
//! - **Sync channel**: the [`SyncChannel`] collaborator trait over the
//!   encrypted remote store.
//! - **Errors**: [`SyncError`] via `thiserror`.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod flags;
pub mod logging;
pub mod mode;
pub mod sync;

pub use errors::SyncError;
pub use events::{AgentSessionMessage, SessionEvent};
pub use mode::{ExecutionMode, PermissionMode};
pub use sync::{PendingPreview, SyncChannel};
