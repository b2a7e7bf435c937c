//! The plugin contract and its optional capability traits.
//!
//! Every plugin implements [`Plugin`]: identity metadata, four lifecycle
//! operations, and config accessors. Beyond that a plugin may opt into any
//! number of capabilities by implementing the matching trait and overriding
//! the corresponding `as_*` accessor to return `Some(self)`; the registry
//! wires whatever it finds at registration time.
//!
//! ```rust,ignore
//! struct CachePlugin { /* … */ }
//!
//! #[async_trait]
//! impl Plugin for CachePlugin {
//!     fn info(&self) -> PluginInfo {
//!         PluginInfo {
//!             id: "com.example.cache",
//!             name: "Cache",
//!             version: "1.0.0",
//!             description: "In-process cache service",
//!             author: "Example Author",
//!         }
//!     }
//!
//!     fn as_service(&self) -> Option<&dyn ServiceProvider> {
//!         Some(self)
//!     }
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PluginContext;
use crate::error::PluginResult;
use crate::event::EventHandler;
use crate::hook::HookHandler;
use crate::route::{NavItem, Route, RouteMiddleware};
use crate::schema::{ConfigField, ConfigSchema};

/// A plugin's configuration document: field name to JSON value.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Opaque service handle published by a [`ServiceProvider`] plugin.
///
/// The runtime never inspects the handle; consumers downcast it back to the
/// concrete type through
/// [`PluginContext::service`](crate::context::PluginContext::service).
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Descriptive metadata carried by every plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginInfo {
    /// Stable unique id in reverse-domain form, e.g. `"com.obtura.auth"`.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Semantic version string.
    pub version: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Plugin author.
    pub author: &'static str,
}

/// Lifecycle state tracked per plugin by the registry.
///
/// ```text
/// register()    ──► Registered
/// initialize()  ──► Initialized
/// start()       ──► Started       (is_enabled() == true)
/// stop()        ──► Stopped
/// ```
///
/// Transitions only move forward; a failed advancement leaves the plugin in
/// its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluginState {
    /// Registered but not yet initialized.
    Registered,
    /// `initialize` completed.
    Initialized,
    /// `start` completed; the plugin is live.
    Started,
    /// `stop` completed.
    Stopped,
}

/// The base contract every plugin implements.
///
/// Lifecycle methods receive a [`PluginContext`], a read-only facade over
/// the registry (service lookup, events, hooks, own config). Plugins own any
/// resources they acquire in `start` and must release them in `stop`.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Identity metadata. `info().id` must be unique within a registry.
    fn info(&self) -> PluginInfo;

    /// Ids of plugins that must already be registered before this one.
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// One-time setup, run in dependency order before any plugin starts.
    async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Activates the plugin's services.
    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Releases resources acquired in `start`.
    async fn stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Final cleanup, run best-effort during host shutdown after `stop`.
    async fn destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Default configuration document, materialized on first config read.
    fn default_config(&self) -> ConfigMap {
        ConfigMap::new()
    }

    /// Explicit configuration schema.
    ///
    /// Returning `None` lets the config manager infer one from
    /// [`default_config`](Plugin::default_config).
    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    // ─── Capability accessors ─────────────────────────────────────────────

    /// HTTP routes contribution.
    fn as_routable(&self) -> Option<&dyn Routable> {
        None
    }

    /// Admin routes and navigation contribution.
    fn as_admin(&self) -> Option<&dyn AdminPages> {
        None
    }

    /// Shared service publication.
    fn as_service(&self) -> Option<&dyn ServiceProvider> {
        None
    }

    /// Hook handler contribution.
    fn as_hookable(&self) -> Option<&dyn Hookable> {
        None
    }

    /// Event subscriptions.
    fn as_subscriber(&self) -> Option<&dyn Subscriber> {
        None
    }

    /// Global request middleware contribution.
    fn as_middleware(&self) -> Option<&dyn HttpMiddleware> {
        None
    }

    /// Editable settings surface.
    fn as_settings(&self) -> Option<&dyn Settings> {
        None
    }
}

/// Contributes HTTP routes, bound into the host router once it is attached.
pub trait Routable: Send + Sync {
    /// The routes this plugin serves.
    fn routes(&self) -> Vec<Route>;
}

/// Contributes admin-area routes and navigation.
///
/// Admin route paths are prefixed with `/admin` and wrapped with the host's
/// admin guard middleware when one is installed.
pub trait AdminPages: Send + Sync {
    /// Routes under the admin prefix; declare paths without the prefix.
    fn admin_routes(&self) -> Vec<Route>;

    /// Entries for the admin navigation menu.
    fn admin_navigation(&self) -> Vec<NavItem>;
}

/// Publishes one opaque service handle under the plugin's id.
pub trait ServiceProvider: Send + Sync {
    /// The service instance other plugins can look up.
    fn service(&self) -> ServiceHandle;
}

/// Registers handlers on named hook pipelines.
pub trait Hookable: Send + Sync {
    /// Hook-name to handler pairs. Order *between* plugins follows plugin
    /// registration order; order within this list is preserved as returned.
    fn hooks(&self) -> Vec<(String, HookHandler)>;
}

/// Subscribes to named events.
pub trait Subscriber: Send + Sync {
    /// Event-name to handler pairs.
    fn event_handlers(&self) -> Vec<(String, EventHandler)>;
}

/// Contributes one global request wrapper, applied to the whole router.
pub trait HttpMiddleware: Send + Sync {
    /// The request wrapper.
    fn middleware(&self) -> RouteMiddleware;
}

/// Exposes editable settings and reacts to changes.
#[async_trait]
pub trait Settings: Send + Sync {
    /// The settings surface, as field descriptors with display metadata.
    fn settings(&self) -> Vec<ConfigField>;

    /// Called once per top-level key whose value changed in a successful
    /// config update.
    async fn on_setting_change(&self, key: &str, old: &Value, new: &Value) -> PluginResult<()>;
}
