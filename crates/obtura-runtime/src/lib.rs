//! # Obtura Runtime
//!
//! The process-embedded plugin runtime behind the Obtura web framework.
//!
//! - [`Registry`]: plugin membership, dependency-ordered lifecycle, and the
//!   service / hook / event buses, plus the deferred route queue that binds
//!   plugin routes into the host's axum router only once it is attached
//! - [`ConfigManager`]: schema-validated, cached, write-through per-plugin
//!   configuration over a pluggable [`ConfigStorage`] backend (in-memory and
//!   one-JSON-document-per-plugin file storage ship)
//! - [`ObturaApp`]: host orchestration (config file, logging, bootstrap,
//!   serving, graceful shutdown)
//!
//! Plugin-facing contracts live in `obtura-core`; this crate is the side the
//! host binary links.

pub mod app;
mod binder;
pub mod config;
pub mod error;
mod events;
pub mod host;
pub mod logging;
pub mod registry;

pub use app::{AppBuilder, ObturaApp};
pub use binder::PluginMiddlewareLayer;
pub use config::{ConfigManager, ConfigStorage, JsonFileConfigStorage, MemoryConfigStorage};
pub use error::{HostError, HostResult};
pub use host::{ConfigLoader, HostConfig, ServerConfig};
pub use logging::{LogFormat, LogLevel, LogOutput, LoggingBuilder, LoggingConfig};
pub use registry::{Registry, RegistryBuilder};
