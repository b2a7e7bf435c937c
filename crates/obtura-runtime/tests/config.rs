//! Config persistence across registry instances with file-backed storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use obtura_core::plugin::{ConfigMap, Plugin, PluginInfo};
use obtura_runtime::{JsonFileConfigStorage, Registry};

fn as_map(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

struct GreeterPlugin;

#[async_trait]
impl Plugin for GreeterPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "com.test.greeter",
            name: "Greeter",
            version: "0.1.0",
            description: "test plugin",
            author: "tests",
        }
    }

    fn default_config(&self) -> ConfigMap {
        as_map(json!({"greeting": "hello"}))
    }
}

fn registry_at(dir: &std::path::Path) -> Arc<Registry> {
    let storage = JsonFileConfigStorage::new(dir).unwrap();
    Registry::builder().storage(Box::new(storage)).build()
}

#[tokio::test]
async fn defaults_materialize_into_files_on_first_read() {
    let dir = tempfile::tempdir().unwrap();

    let registry = registry_at(dir.path());
    registry.register(Arc::new(GreeterPlugin)).unwrap();

    let config = registry.get_config("com.test.greeter").await.unwrap();
    assert_eq!(config["greeting"], json!("hello"));

    // The lazy write produced a real document.
    let path = dir.path().join("com.test.greeter.json");
    let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["greeting"], json!("hello"));
}

#[tokio::test]
async fn stored_config_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = registry_at(dir.path());
        registry.register(Arc::new(GreeterPlugin)).unwrap();
        registry
            .set_config("com.test.greeter", as_map(json!({"greeting": "bonjour"})))
            .await
            .unwrap();
    }

    // A fresh registry over the same directory sees the stored value, not
    // the default.
    let registry = registry_at(dir.path());
    registry.register(Arc::new(GreeterPlugin)).unwrap();
    let config = registry.get_config("com.test.greeter").await.unwrap();
    assert_eq!(config["greeting"], json!("bonjour"));
}

#[tokio::test]
async fn config_manager_lists_persisted_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());
    registry.register(Arc::new(GreeterPlugin)).unwrap();

    registry.get_config("com.test.greeter").await.unwrap();

    let ids = registry.config_manager().list().await.unwrap();
    assert_eq!(ids, ["com.test.greeter"]);
}
