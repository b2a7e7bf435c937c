//! Error types shared across the Obtura runtime and plugins.

use serde_json::Value;
use thiserror::Error;

/// Boxed error type used for plugin-authored failures.
///
/// Plugins are free to return any error type; the runtime only needs to
/// display and propagate it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for plugin lifecycle and handler operations.
pub type PluginResult<T> = Result<T, BoxError>;

/// Errors raised by the plugin registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A plugin with the same id is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateId(String),

    /// A declared dependency is not present in the registry.
    #[error("plugin '{plugin}' requires '{dependency}', which is not registered")]
    MissingDependency {
        /// The plugin being registered.
        plugin: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    ///
    /// Registration refuses dependencies on absent plugins, so this cannot be
    /// constructed through the public API; the lifecycle traversal still
    /// checks for it.
    #[error("plugin dependency cycle detected among: {0}")]
    DependencyCycle(String),

    /// No plugin registered under the given id.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// A plugin's `initialize` failed; bootstrap is aborted.
    #[error("failed to initialize plugin '{plugin}'")]
    Initialize {
        /// The failing plugin id.
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// A plugin's `start` failed; bootstrap is aborted.
    #[error("failed to start plugin '{plugin}'")]
    Start {
        /// The failing plugin id.
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// One or more plugins failed to stop.
    #[error(transparent)]
    Stop(#[from] StopError),

    /// A configuration operation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Aggregate error returned from `Registry::stop`.
///
/// Every started plugin is stopped even when earlier ones fail; the failures
/// are collected here rather than short-circuiting.
#[derive(Debug)]
pub struct StopError {
    /// Plugin id paired with the error its `stop` returned.
    pub failures: Vec<(String, BoxError)>,
}

impl std::fmt::Display for StopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to stop {} plugin(s):", self.failures.len())?;
        for (id, err) in &self.failures {
            write!(f, " {id}: {err};")?;
        }
        Ok(())
    }
}

impl std::error::Error for StopError {}

/// Errors raised by the configuration manager and storage backends.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No stored configuration (and no registered default) for the id.
    #[error("no configuration found for plugin: {0}")]
    NotFound(String),

    /// A value was rejected by the registered schema.
    ///
    /// Carries the first failing field and the reason it failed.
    #[error("invalid configuration: field '{field}': {reason}")]
    Validation {
        /// The offending field name.
        field: String,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// A plugin id is unusable as a storage key (empty, contains a path
    /// separator, or a parent-directory segment).
    #[error("invalid plugin id: {0:?}")]
    InvalidId(String),

    /// The storage backend failed.
    #[error("config storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A config document could not be encoded or decoded.
    #[error("config serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a validation error for the given field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned when a hook chain aborts.
///
/// The chain halts on the first failing handler. `last_value` holds the last
/// value produced by a *successful* handler (the original input when the
/// first handler fails), so callers can decide whether the partial result is
/// usable.
#[derive(Debug, Error)]
#[error("hook '{hook}' handler from plugin '{plugin}' failed: {source}")]
pub struct HookError {
    /// The hook name that was triggered.
    pub hook: String,
    /// The plugin whose handler failed.
    pub plugin: String,
    /// Output of the last successful handler in the chain.
    pub last_value: Value,
    #[source]
    pub source: BoxError,
}

/// Errors raised by authentication providers and the auth plugin.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The supplied credentials did not match a user.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No user exists for the given identity.
    #[error("user not found")]
    UserNotFound,

    /// The user account exists but is deactivated.
    #[error("user account is inactive")]
    UserInactive,

    /// No provider registered under the given name.
    #[error("auth provider '{0}' not found")]
    UnknownProvider(String),

    /// A provider with the same name is already registered.
    #[error("auth provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// The request is not authenticated or not authorized.
    #[error("unauthorized")]
    Unauthorized,

    /// A provider choice or credential change could not be persisted.
    #[error("failed to persist auth configuration: {0}")]
    Persistence(String),

    /// Session material could not be produced or read.
    #[error("session error: {0}")]
    Session(String),
}
