//! Host-level error types.

use std::path::PathBuf;

use thiserror::Error;

use obtura_core::error::RegistryError;

/// Errors raised while loading host configuration or running the app.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration file not found at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Filesystem or network failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failure.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A registry operation failed during bootstrap or shutdown.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
