//! # Obtura
//!
//! A modular web application framework whose value concentrates in a plugin
//! runtime: compiled-in plugins contribute routes, services, hooks, events,
//! configuration surfaces, and admin navigation to one long-running HTTP
//! process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────────────────────────────┐    ┌─────────────┐
//! │ ObturaApp│───▶│ Registry                      │───▶│ Plugins     │
//! │ (host)   │    │  lifecycle · services · hooks │    │ (capability │
//! └──────────┘    │  events · deferred routes     │    │  traits)    │
//!       │         └──────────────┬────────────────┘    └─────────────┘
//!       │                        │
//!       ▼                        ▼
//!  axum Router            ConfigManager ── ConfigStorage (memory / JSON files)
//! ```
//!
//! - `obtura-core`: the plugin contracts
//! - `obtura-runtime`: registry, config manager, host orchestration
//! - `obtura-auth`: the authentication plugin and session provider
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use obtura::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> obtura::HostResult<()> {
//!     let app = ObturaApp::new();
//!
//!     let auth = Arc::new(AuthPlugin::new());
//!     app.register(auth.clone())?;
//!     app.registry().set_admin_guard(auth.require_admin());
//!
//!     app.run(axum::Router::new()).await
//! }
//! ```

pub use obtura_core::{
    auth, context, error, event, hook, plugin, route, schema, AuthError, AuthProvider, AuthUser,
    BoxError, ConfigError, ConfigField, ConfigMap, ConfigSchema, CurrentUser, Event, EventHandler,
    FieldOption, FieldType, FieldValidation, GuestUser, HookError, HookHandler, NavItem,
    NoAuthProvider, Plugin, PluginContext, PluginInfo, PluginResult, PluginState, RegistryError,
    Route, RouteMiddleware, RouteService, RuntimeHandle, StopError,
};

pub use obtura_runtime::{
    AppBuilder, ConfigLoader, ConfigManager, ConfigStorage, HostConfig, HostError, HostResult,
    JsonFileConfigStorage, LoggingBuilder, LoggingConfig, MemoryConfigStorage, ObturaApp, Registry,
};

pub use obtura_auth::{AuthConfig, AuthPlugin, SessionProvider, AUTH_PLUGIN_ID};

/// The most common imports for hosts and plugin authors.
pub mod prelude {
    pub use obtura_core::auth::{current_user, AuthProvider, AuthUser};
    pub use obtura_core::context::PluginContext;
    pub use obtura_core::error::{PluginResult, RegistryError};
    pub use obtura_core::event::{Event, EventHandler};
    pub use obtura_core::hook::HookHandler;
    pub use obtura_core::plugin::{
        AdminPages, ConfigMap, Hookable, HttpMiddleware, Plugin, PluginInfo, Routable,
        ServiceProvider, Settings, Subscriber,
    };
    pub use obtura_core::route::{handler, NavItem, Route};
    pub use obtura_core::schema::{ConfigField, ConfigSchema, FieldType};

    pub use obtura_auth::AuthPlugin;
    pub use obtura_runtime::{ObturaApp, Registry};
}
