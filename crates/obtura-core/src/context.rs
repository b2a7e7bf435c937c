//! The read-only runtime facade handed to plugins.
//!
//! Plugins never hold the concrete registry type; lifecycle methods receive
//! a [`PluginContext`] wrapping a [`RuntimeHandle`], the narrow surface the
//! runtime exposes to plugin code: service lookup, event emission, hook
//! triggering, and reading or updating the plugin's own configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, HookError, RegistryError};
use crate::event::Event;
use crate::plugin::{ConfigMap, ServiceHandle};

/// The registry operations visible to plugin code.
///
/// Implemented by the runtime's registry; plugins only ever see it behind
/// `Arc<dyn RuntimeHandle>`.
#[async_trait]
pub trait RuntimeHandle: Send + Sync {
    /// Looks up the service published by the plugin with the given id.
    fn service(&self, id: &str) -> Option<ServiceHandle>;

    /// Enqueues an event for asynchronous, best-effort dispatch. Never
    /// blocks; the event is dropped if the queue is full.
    fn emit_event(&self, event: Event);

    /// Runs the named hook chain on `value`.
    async fn trigger_hook(&self, name: &str, value: Value) -> Result<Value, HookError>;

    /// Reads the current configuration document for the given plugin.
    async fn config(&self, id: &str) -> Option<ConfigMap>;

    /// Validates and persists a configuration document for the given plugin.
    async fn set_config(&self, id: &str, value: ConfigMap) -> Result<(), RegistryError>;

    /// Returns `true` iff the plugin with the given id is started.
    fn is_enabled(&self, id: &str) -> bool;
}

/// Per-plugin view over the runtime, passed to every lifecycle call.
#[derive(Clone)]
pub struct PluginContext {
    runtime: Arc<dyn RuntimeHandle>,
    plugin_id: String,
}

impl PluginContext {
    /// Creates a context scoped to the given plugin id.
    pub fn new(runtime: Arc<dyn RuntimeHandle>, plugin_id: impl Into<String>) -> Self {
        Self {
            runtime,
            plugin_id: plugin_id.into(),
        }
    }

    /// The id of the plugin this context belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Looks up another plugin's service as an opaque handle.
    pub fn service_raw(&self, id: &str) -> Option<ServiceHandle> {
        self.runtime.service(id)
    }

    /// Looks up another plugin's service and downcasts it to `T`.
    ///
    /// Returns `None` when the plugin published nothing or the handle is not
    /// a `T`; a type mismatch fails cleanly rather than panicking.
    pub fn service<T: Send + Sync + 'static>(&self, id: &str) -> Option<Arc<T>> {
        self.runtime.service(id)?.downcast::<T>().ok()
    }

    /// Emits an event attributed to this plugin. Fire-and-forget.
    pub fn emit(&self, name: impl Into<String>, payload: Value) {
        self.runtime
            .emit_event(Event::from_plugin(name, self.plugin_id.clone(), payload));
    }

    /// Runs the named hook chain on `value`.
    pub async fn trigger_hook(&self, name: &str, value: Value) -> Result<Value, HookError> {
        self.runtime.trigger_hook(name, value).await
    }

    /// Reads this plugin's current configuration document.
    pub async fn config(&self) -> Option<ConfigMap> {
        self.runtime.config(&self.plugin_id).await
    }

    /// Validates and persists this plugin's configuration document.
    ///
    /// Goes through the same write-through path as an admin config update,
    /// including schema validation.
    pub async fn update_config(&self, value: ConfigMap) -> Result<(), RegistryError> {
        self.runtime.set_config(&self.plugin_id, value).await
    }

    /// Reads this plugin's configuration decoded into a typed structure.
    pub async fn typed_config<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let map = self
            .config()
            .await
            .ok_or_else(|| ConfigError::NotFound(self.plugin_id.clone()))?;
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Returns `true` iff the plugin with the given id is started.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.runtime.is_enabled(id)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}
