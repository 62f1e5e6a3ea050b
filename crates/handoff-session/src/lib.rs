//! # handoff-session
//!
//! The state shared between the two mode drivers:
//!
//! - [`MessageQueue`]: ordered buffer of outbound user messages, coalesced by
//!   permission-mode fingerprint, with an atomic isolate-and-clear operation.
//! - [`next_message_batch`]: the wait/race coordinator. Sleeps until either
//!   real input or a terminal cancellation is observed, racing the queue
//!   against the sync channel's metadata signal under a derived cancellation
//!   scope.
//! - [`Session`]: durable cross-driver state. Identity (session id +
//!   transcript path), per-spawn configuration, last permission mode, and
//!   the identity-found pub/sub list.

#![deny(unsafe_code)]

pub mod queue;
pub mod session;
pub mod wait;

pub use queue::{MessageBatch, MessageQueue, QueueItem};
pub use session::{CallbackHandle, HookInfo, Identity, Session, SessionConfig, SessionFound};
pub use wait::next_message_batch;
