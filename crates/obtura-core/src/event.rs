//! Events: asynchronous best-effort notifications fanned out to subscribers.
//!
//! Events are emitted onto a bounded queue owned by the registry and
//! dispatched from a background task to every plugin that declared a handler
//! for the event's name. There is no delivery guarantee: a full queue drops
//! the event, and handler errors are logged and swallowed.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BoxError;

/// A system event: a name, the emitting plugin's id, and an opaque payload.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name subscribers match on, e.g. `"page.viewed"`.
    pub name: String,
    /// Id of the plugin that emitted the event; empty for host-emitted events.
    pub source: String,
    /// Opaque payload; subscribers decode what they understand.
    pub payload: Value,
}

impl Event {
    /// Creates an event with an empty source.
    ///
    /// The source is filled in automatically when emitting through a
    /// [`PluginContext`](crate::context::PluginContext).
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            payload,
        }
    }

    /// Creates an event attributed to the given plugin.
    pub fn from_plugin(name: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            payload,
        }
    }
}

type EventFn = dyn Fn(Event) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// One subscriber callback for a named event.
#[derive(Clone)]
pub struct EventHandler(Arc<EventFn>);

impl EventHandler {
    /// Wraps an async event callback.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self(Arc::new(move |event| Box::pin(f(event))))
    }

    /// Invokes the handler.
    pub async fn call(&self, event: Event) -> Result<(), BoxError> {
        (self.0)(event).await
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventHandler")
    }
}
