//! The configuration manager.
//!
//! Owns the canonical current value of every plugin's configuration:
//! validates proposed values against registered schemas, persists through a
//! [`ConfigStorage`] backend, and caches documents in memory. Writes go
//! through to storage before the cache is updated, so a persistence failure
//! leaves the cached value unchanged.
//!
//! A plugin with no stored document reads its declared default; the default
//! is persisted lazily on that first access so later reads are stable across
//! restarts.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use obtura_core::error::ConfigError;
use obtura_core::plugin::ConfigMap;
use obtura_core::schema::ConfigSchema;

use super::storage::{ConfigStorage, MemoryConfigStorage};

/// Validates, caches, and persists per-plugin configuration.
pub struct ConfigManager {
    storage: Box<dyn ConfigStorage>,
    schemas: RwLock<HashMap<String, ConfigSchema>>,
    defaults: RwLock<HashMap<String, ConfigMap>>,
    cache: RwLock<HashMap<String, ConfigMap>>,
    /// Serializes the validate → persist → cache-update section of `set`.
    write_gate: Mutex<()>,
}

impl ConfigManager {
    /// Creates a manager backed by in-memory storage.
    pub fn new() -> Self {
        Self::with_storage(Box::new(MemoryConfigStorage::new()))
    }

    /// Creates a manager with a specific storage backend.
    pub fn with_storage(storage: Box<dyn ConfigStorage>) -> Self {
        Self {
            storage,
            schemas: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
        }
    }

    /// Registers (or overwrites) the schema for a plugin.
    ///
    /// Existing stored configuration is not re-validated.
    pub fn register_schema(&self, id: &str, schema: ConfigSchema) {
        self.schemas.write().insert(id.to_string(), schema);
    }

    /// Returns the registered schema for a plugin, if any.
    pub fn get_schema(&self, id: &str) -> Option<ConfigSchema> {
        self.schemas.read().get(id).cloned()
    }

    /// Installs the default document materialized when nothing is stored.
    pub fn set_default(&self, id: &str, defaults: ConfigMap) {
        self.defaults.write().insert(id.to_string(), defaults);
    }

    /// Validates and persists a configuration document.
    ///
    /// When a schema is registered the document must pass it; the first
    /// failing field is reported. On a storage failure the in-memory cache
    /// is left unchanged.
    pub async fn set(&self, id: &str, value: ConfigMap) -> Result<(), ConfigError> {
        let _gate = self.write_gate.lock().await;

        if let Some(schema) = self.get_schema(id) {
            schema.validate(&value)?;
        }
        self.storage.save(id, &value).await?;
        self.cache.write().insert(id.to_string(), value);
        Ok(())
    }

    /// Returns the current configuration document for a plugin.
    ///
    /// Resolution order: cache, then storage, then the declared default,
    /// which is persisted on this first access. A storage read error is
    /// treated as a miss. Returns `None` only when the plugin has neither a
    /// stored document nor a declared default.
    pub async fn get(&self, id: &str) -> Option<ConfigMap> {
        if let Some(cached) = self.cache.read().get(id) {
            return Some(cached.clone());
        }

        match self.storage.load(id).await {
            Ok(stored) => {
                self.cache.write().insert(id.to_string(), stored.clone());
                Some(stored)
            }
            Err(err) => {
                if !matches!(err, ConfigError::NotFound(_)) {
                    debug!(plugin = %id, error = %err, "config load failed, using defaults");
                }
                let default = self.defaults.read().get(id).cloned()?;
                if let Err(error) = self.storage.save(id, &default).await {
                    warn!(plugin = %id, error = %error, "failed to persist default config");
                }
                self.cache.write().insert(id.to_string(), default.clone());
                Some(default)
            }
        }
    }

    /// Loads the configuration for a plugin decoded into `target`'s type.
    pub async fn load_as<T: DeserializeOwned>(&self, id: &str) -> Result<T, ConfigError> {
        let map = self
            .get(id)
            .await
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))?;
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Removes the stored document and cached value for a plugin.
    pub async fn delete(&self, id: &str) -> Result<(), ConfigError> {
        let _gate = self.write_gate.lock().await;
        self.storage.delete(id).await?;
        self.cache.write().remove(id);
        Ok(())
    }

    /// Lists every plugin id with a stored document.
    pub async fn list(&self) -> Result<Vec<String>, ConfigError> {
        self.storage.list().await
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obtura_core::schema::{ConfigField, FieldType, FieldValidation};
    use serde_json::json;

    fn as_map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn port_schema() -> ConfigSchema {
        ConfigSchema::new([ConfigField::new("port", FieldType::Number)
            .required()
            .validation(FieldValidation {
                min: Some(1.0),
                max: Some(65535.0),
                ..Default::default()
            })])
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let manager = ConfigManager::new();
        let value = as_map(json!({"port": 8080}));
        manager.set("com.example.web", value.clone()).await.unwrap();
        assert_eq!(manager.get("com.example.web").await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_rejected_value_leaves_config_unchanged() {
        let manager = ConfigManager::new();
        manager.register_schema("com.example.web", port_schema());

        let good = as_map(json!({"port": 8080}));
        manager.set("com.example.web", good.clone()).await.unwrap();

        let err = manager
            .set("com.example.web", as_map(json!({"port": 70000})))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "port"));

        assert_eq!(manager.get("com.example.web").await.unwrap(), good);
    }

    #[tokio::test]
    async fn test_default_materialized_once_and_stable() {
        let manager = ConfigManager::new();
        let defaults = as_map(json!({"greeting": "hi"}));
        manager.set_default("com.example.hello", defaults.clone());

        let first = manager.get("com.example.hello").await.unwrap();
        assert_eq!(first, defaults);

        // The default was persisted on first access.
        assert_eq!(manager.list().await.unwrap(), ["com.example.hello"]);

        let second = manager.get("com.example.hello").await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_get_without_default_or_stored_is_none() {
        let manager = ConfigManager::new();
        assert!(manager.get("com.example.absent").await.is_none());
    }

    #[tokio::test]
    async fn test_load_as_typed_view() {
        #[derive(serde::Deserialize)]
        struct WebConfig {
            port: u16,
        }

        let manager = ConfigManager::new();
        manager
            .set("com.example.web", as_map(json!({"port": 8080})))
            .await
            .unwrap();

        let config: WebConfig = manager.load_as("com.example.web").await.unwrap();
        assert_eq!(config.port, 8080);
    }

    #[tokio::test]
    async fn test_schema_overwrite_is_idempotent() {
        let manager = ConfigManager::new();
        manager.register_schema("com.example.web", port_schema());
        manager.register_schema("com.example.web", port_schema());
        assert_eq!(manager.get_schema("com.example.web").unwrap().fields.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_clears_cache_and_storage() {
        let manager = ConfigManager::new();
        manager
            .set("com.example.web", as_map(json!({"port": 1})))
            .await
            .unwrap();
        manager.delete("com.example.web").await.unwrap();
        assert!(manager.get("com.example.web").await.is_none());
    }
}
