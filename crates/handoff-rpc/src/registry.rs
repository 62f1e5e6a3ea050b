//! Method registry and async dispatch.
//!
//! Unlike a server whose handler set is fixed at startup, this registry is
//! re-registered at runtime: whichever driver is active installs its own
//! `abort`/`switch` handlers on entry and resets them to no-ops in its
//! cleanup. The last registration per method wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::errors::{self, RpcError};
use crate::types::{RpcRequest, RpcResponse};

/// Boxed async handler closure.
pub type HandlerFn =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum time a single handler is allowed to run.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

    /// Register a handler for a method name. Last registration wins.
    pub fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let boxed: HandlerFn = Arc::new(move |params| Box::pin(handler(params)));
        let _ = self.handlers.write().insert(method.to_owned(), boxed);
    }

    /// Replace a method's handler with a no-op returning `null`.
    ///
    /// Driver cleanup calls this so a stale handler can never act on a
    /// session the driver no longer controls.
    pub fn reset(&self, method: &str) {
        self.register(method, |_params| async { Ok(Value::Null) });
    }

    /// Dispatch a request to the appropriate handler.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let method = request.method.clone();
        let handler = self.handlers.read().get(&method).map(Arc::clone);
        let Some(handler) = handler else {
            return RpcResponse::error(
                &request.id,
                errors::METHOD_NOT_FOUND,
                format!("Method '{method}' not found"),
            );
        };

        let result =
            tokio::time::timeout(Self::HANDLER_TIMEOUT, handler(request.params)).await;

        match result {
            Ok(Ok(value)) => RpcResponse::success(&request.id, value),
            Ok(Err(err)) => RpcResponse {
                id: request.id,
                success: false,
                result: None,
                error: Some(err.to_error_body()),
            },
            Err(_elapsed) => {
                warn!(method, "RPC handler timed out after {:?}", Self::HANDLER_TIMEOUT);
                RpcResponse::error(
                    &request.id,
                    errors::INTERNAL_ERROR,
                    format!("Handler for '{method}' timed out"),
                )
            }
        }
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }
}
