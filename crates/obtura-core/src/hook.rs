//! Hook handlers: named synchronous transformation pipelines.
//!
//! A hook is a chain of handlers registered under a shared name. Triggering
//! the hook feeds the initial value to the first handler and each handler's
//! output to the next, in registration order (which equals plugin
//! registration order). The first handler error aborts the chain; the
//! resulting [`HookError`](crate::error::HookError) carries the last value a
//! successful handler produced.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BoxError;

type HookFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

/// One handler in a hook chain: transforms a value or fails.
#[derive(Clone)]
pub struct HookHandler(Arc<HookFn>);

impl HookHandler {
    /// Wraps an async transformation function.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// HookHandler::new(|value| async move {
    ///     Ok(Value::String(format!("{}|normalized", value.as_str().unwrap_or(""))))
    /// })
    /// ```
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self(Arc::new(move |value| Box::pin(f(value))))
    }

    /// Runs the handler on `value`.
    pub async fn call(&self, value: Value) -> Result<Value, BoxError> {
        (self.0)(value).await
    }
}

impl std::fmt::Debug for HookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HookHandler")
    }
}
