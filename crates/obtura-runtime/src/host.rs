//! Host configuration: the `obtura.yaml` file and its loader.
//!
//! The host config covers the process-level concerns: listen address,
//! logging, and where per-plugin config documents live. Per-plugin
//! configuration itself goes through the registry's [`ConfigManager`]
//! (one JSON document per plugin), not through this file.
//!
//! # Example (`obtura.yaml`)
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! logging:
//!   level: debug
//!   format: pretty
//! config_dir: ${OBTURA_CONFIG_DIR:-configs/plugins}
//! ```
//!
//! [`ConfigManager`]: crate::config::ConfigManager

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HostError, HostResult};
use crate::logging::LoggingConfig;

/// Listen address configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Root host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Listen address.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Directory holding one JSON config document per plugin.
    pub config_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            config_dir: PathBuf::from("configs/plugins"),
        }
    }
}

/// Configuration file loader with search paths and environment expansion.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Creates a loader with no search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory (`<config>/obtura`) to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("obtura")),
            None => self,
        }
    }

    /// Loads configuration from the first file found, or defaults.
    pub fn load(&self) -> HostResult<HostConfig> {
        if let Some(path) = self.find_config_file() {
            return self.load_from_file(&path);
        }
        info!("no configuration file found, using defaults");
        Ok(HostConfig::default())
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> HostResult<HostConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HostError::FileNotFound(path.to_path_buf()));
        }
        info!(path = %path.display(), "loading host configuration");
        let content = std::fs::read_to_string(path)?;
        self.load_from_str(&content)
    }

    /// Parses configuration from a YAML string.
    pub fn load_from_str(&self, yaml: &str) -> HostResult<HostConfig> {
        let expanded = expand_env_vars(yaml);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        const CONFIG_NAMES: &[&str] = &["obtura.yaml", "obtura.yml", ".obtura.yaml", ".obtura.yml"];

        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let path = search_path.join(name);
                debug!(path = %path.display(), "checking for config file");
                if path.exists() {
                    return Some(path);
                }
            }
        }
        None
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_current_dir().with_user_config_dir()
    }
}

/// Expands `${VAR_NAME}` and `${VAR_NAME:-default}` references.
fn expand_env_vars(content: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}")
        .expect("static pattern");
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).map(|m| m.as_str()).unwrap_or_default();
        let var_name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = std::env::var(var_name)
            .ok()
            .or_else(|| default_value.map(String::from))
            .unwrap_or_default();

        result = result.replace(full_match, &value);
    }
    result
}
