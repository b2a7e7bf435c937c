//! # Obtura Core
//!
//! Plugin contracts for the Obtura web framework.
//!
//! This crate defines everything a plugin author needs and nothing the
//! runtime keeps to itself:
//!
//! - [`Plugin`]: the base contract (identity, lifecycle, config accessors)
//!   plus opt-in capability traits ([`Routable`], [`AdminPages`],
//!   [`ServiceProvider`], [`Hookable`], [`Subscriber`], [`HttpMiddleware`],
//!   [`Settings`])
//! - [`Route`] declarations and the boxed handler/middleware types shared
//!   with the host router
//! - [`HookHandler`] / [`EventHandler`]: the two bus callback shapes
//! - [`ConfigSchema`]: typed validation over untyped config documents
//! - [`AuthProvider`]: the pluggable authentication seam
//! - [`PluginContext`]: the read-only runtime facade handed to plugins
//!
//! The runtime side (registry, config manager, route binder, host app) lives
//! in `obtura-runtime`.

pub mod auth;
pub mod context;
pub mod error;
pub mod event;
pub mod hook;
pub mod plugin;
pub mod route;
pub mod schema;

pub use auth::{current_user, AuthProvider, AuthUser, CurrentUser, GuestUser, NoAuthProvider};
pub use context::{PluginContext, RuntimeHandle};
pub use error::{
    AuthError, BoxError, ConfigError, HookError, PluginResult, RegistryError, StopError,
};
pub use event::{Event, EventHandler};
pub use hook::HookHandler;
pub use plugin::{
    AdminPages, ConfigMap, Hookable, HttpMiddleware, Plugin, PluginInfo, PluginState, Routable,
    ServiceHandle, ServiceProvider, Settings, Subscriber,
};
pub use route::{handler, NavItem, Route, RouteMiddleware, RouteService};
pub use schema::{ConfigField, ConfigSchema, FieldOption, FieldType, FieldValidation};
