//! # handoff-rpc
//!
//! The RPC surface the mobile/web client drives mode switching through:
//!
//! - Wire types ([`RpcRequest`], [`RpcResponse`]) in the store's camelCase
//!   format.
//! - Error codes and [`RpcError`].
//! - [`MethodRegistry`]: a resettable method-name-to-handler map. The active
//!   driver registers `abort` and `switch` on entry and resets them to
//!   no-ops in its cleanup; the last registration per method wins.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod types;

pub use errors::RpcError;
pub use registry::{HandlerFn, MethodRegistry};
pub use types::{RpcRequest, RpcResponse, SwitchParams};
