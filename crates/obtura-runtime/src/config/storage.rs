//! Persistence backends for per-plugin configuration documents.
//!
//! Two implementations ship: a guarded in-memory map for tests and hosts
//! without a writable filesystem, and a one-JSON-document-per-plugin file
//! store. Both hand out copies of stored documents so callers cannot mutate
//! internal state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;
use tokio::sync::Mutex;

use obtura_core::error::ConfigError;
use obtura_core::plugin::ConfigMap;

/// File extension used by [`JsonFileConfigStorage`].
const CONFIG_EXT: &str = "json";

/// Storage interface for plugin configuration documents.
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// Retrieves the document for a plugin.
    async fn load(&self, id: &str) -> Result<ConfigMap, ConfigError>;

    /// Stores the document for a plugin.
    async fn save(&self, id: &str, config: &ConfigMap) -> Result<(), ConfigError>;

    /// Removes the document for a plugin. Missing documents are not an error.
    async fn delete(&self, id: &str) -> Result<(), ConfigError>;

    /// Lists all plugin ids with a stored document.
    async fn list(&self) -> Result<Vec<String>, ConfigError>;
}

/// Rejects plugin ids that could escape the storage namespace.
///
/// An id must be non-empty and must not contain a path separator or a
/// parent-directory segment. Violations are reported before any filesystem
/// access.
fn validate_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() || id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(ConfigError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ─── In-memory storage ────────────────────────────────────────────────────

/// In-memory [`ConfigStorage`].
#[derive(Default)]
pub struct MemoryConfigStorage {
    configs: RwLock<HashMap<String, ConfigMap>>,
}

impl MemoryConfigStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStorage for MemoryConfigStorage {
    async fn load(&self, id: &str) -> Result<ConfigMap, ConfigError> {
        self.configs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))
    }

    async fn save(&self, id: &str, config: &ConfigMap) -> Result<(), ConfigError> {
        self.configs.write().insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ConfigError> {
        self.configs.write().remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.configs.read().keys().cloned().collect())
    }
}

// ─── File-backed storage ──────────────────────────────────────────────────

/// File-backed [`ConfigStorage`]: one pretty-printed JSON document per
/// plugin at `<base>/<id>.json`.
pub struct JsonFileConfigStorage {
    base: PathBuf,
    /// Serializes writers; readers go straight to the filesystem.
    write_lock: Mutex<()>,
}

impl JsonFileConfigStorage {
    /// Creates a store rooted at `base`, creating the directory if needed.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self {
            base,
            write_lock: Mutex::new(()),
        })
    }

    /// The directory documents are stored in.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn config_path(&self, id: &str) -> PathBuf {
        self.base.join(format!("{id}.{CONFIG_EXT}"))
    }
}

#[async_trait]
impl ConfigStorage for JsonFileConfigStorage {
    async fn load(&self, id: &str) -> Result<ConfigMap, ConfigError> {
        validate_id(id)?;
        let data = match fs::read(self.config_path(id)).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn save(&self, id: &str, config: &ConfigMap) -> Result<(), ConfigError> {
        validate_id(id)?;
        let data = serde_json::to_vec_pretty(config)?;

        let _guard = self.write_lock.lock().await;
        let path = self.config_path(id);
        // Write to a sibling temp file and rename so readers never observe a
        // torn document.
        let tmp = self.base.join(format!("{id}.{CONFIG_EXT}.tmp"));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ConfigError> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.config_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, ConfigError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.base).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }
}
