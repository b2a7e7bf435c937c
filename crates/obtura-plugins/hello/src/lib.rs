//! A small example plugin: a configurable greeting page.
//!
//! Demonstrates the common capability mix: a public route, an admin page
//! with a navigation entry, a typed config with an explicit schema, and a
//! settings surface that updates the live config on change.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{Html, IntoResponse, Response};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use obtura_core::context::PluginContext;
use obtura_core::error::PluginResult;
use obtura_core::plugin::{AdminPages, ConfigMap, Plugin, PluginInfo, Routable, Settings};
use obtura_core::route::{NavItem, Route};
use obtura_core::schema::{ConfigField, ConfigSchema, FieldType, FieldValidation};

/// Plugin id of the hello plugin.
pub const HELLO_PLUGIN_ID: &str = "com.example.hello";

/// Hello plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelloConfig {
    /// The message shown on the greeting page.
    pub greeting: String,
    /// Show the current time below the greeting.
    pub show_timestamp: bool,
    /// CSS color of the greeting text.
    pub text_color: String,
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            greeting: "Hello from Obtura!".to_string(),
            show_timestamp: false,
            text_color: "blue".to_string(),
        }
    }
}

/// The hello plugin.
pub struct HelloPlugin {
    config: Arc<RwLock<HelloConfig>>,
}

impl HelloPlugin {
    /// Creates the plugin with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(HelloConfig::default())),
        }
    }

    /// The live configuration.
    pub fn config(&self) -> HelloConfig {
        self.config.read().clone()
    }
}

impl Default for HelloPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for HelloPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: HELLO_PLUGIN_ID,
            name: "Hello World",
            version: "1.0.0",
            description: "A simple hello world plugin example",
            author: "Example Author",
        }
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        // Pick up whatever the config store holds, defaults included.
        if let Ok(config) = ctx.typed_config::<HelloConfig>().await {
            *self.config.write() = config;
        }
        Ok(())
    }

    fn default_config(&self) -> ConfigMap {
        match serde_json::to_value(HelloConfig::default()) {
            Ok(Value::Object(map)) => map,
            _ => ConfigMap::new(),
        }
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(ConfigSchema::new([
            ConfigField::new("greeting", FieldType::String)
                .label("Greeting Message")
                .description("The message to display")
                .default_value(json!("Hello from Obtura!"))
                .required()
                .validation(FieldValidation {
                    min_len: Some(1),
                    max_len: Some(200),
                    ..Default::default()
                })
                .group("Display")
                .order(1),
            ConfigField::new("show_timestamp", FieldType::Boolean)
                .label("Show Timestamp")
                .description("Display current time with greeting")
                .default_value(json!(false))
                .group("Display")
                .order(2),
            ConfigField::new("text_color", FieldType::String)
                .label("Text Color")
                .description("Color of the greeting text")
                .default_value(json!("blue"))
                .group("Display")
                .order(3),
        ]))
    }

    fn as_routable(&self) -> Option<&dyn Routable> {
        Some(self)
    }

    fn as_admin(&self) -> Option<&dyn AdminPages> {
        Some(self)
    }

    fn as_settings(&self) -> Option<&dyn Settings> {
        Some(self)
    }
}

impl Routable for HelloPlugin {
    fn routes(&self) -> Vec<Route> {
        let config = Arc::clone(&self.config);
        vec![Route::get("/hello", move |_request: Request<Body>| {
            let config = Arc::clone(&config);
            async move { greeting_page(&config.read().clone()) }
        })]
    }
}

impl AdminPages for HelloPlugin {
    fn admin_routes(&self) -> Vec<Route> {
        let config = Arc::clone(&self.config);
        vec![Route::get("/hello/stats", move |_request: Request<Body>| {
            let config = Arc::clone(&config);
            async move {
                let greeting = config.read().greeting.clone();
                Html(format!(
                    "<h1>Hello Plugin Stats</h1>\
                     <p>This is the admin stats page for the Hello plugin.</p>\
                     <p>Current greeting: {greeting}</p>"
                ))
                .into_response()
            }
        })]
    }

    fn admin_navigation(&self) -> Vec<NavItem> {
        vec![NavItem {
            title: "Hello Plugin".to_string(),
            path: "/admin/hello/stats".to_string(),
            icon: "chat".to_string(),
            order: 200,
            children: Vec::new(),
        }]
    }
}

#[async_trait]
impl Settings for HelloPlugin {
    fn settings(&self) -> Vec<ConfigField> {
        self.config_schema().map(|s| s.fields).unwrap_or_default()
    }

    async fn on_setting_change(&self, key: &str, _old: &Value, new: &Value) -> PluginResult<()> {
        let mut config = self.config.write();
        match key {
            "greeting" => {
                if let Some(value) = new.as_str() {
                    config.greeting = value.to_string();
                }
            }
            "show_timestamp" => {
                if let Some(value) = new.as_bool() {
                    config.show_timestamp = value;
                }
            }
            "text_color" => {
                if let Some(value) = new.as_str() {
                    config.text_color = value.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn greeting_page(config: &HelloConfig) -> Response {
    let timestamp = if config.show_timestamp {
        format!(
            r#"<p class="timestamp">Current time: {}</p>"#,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )
    } else {
        String::new()
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Hello Plugin</title>
    <style>
        body {{
            font-family: sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f0f0f0;
        }}
        .greeting {{
            text-align: center;
            padding: 2rem;
            background: white;
            border-radius: 8px;
        }}
        .greeting h1 {{ color: {}; margin: 0 0 1rem 0; }}
        .timestamp {{ color: #666; font-size: 0.9rem; }}
    </style>
</head>
<body>
    <div class="greeting">
        <h1>{}</h1>
        {timestamp}
        <p><a href="/">Back to Home</a></p>
    </div>
</body>
</html>"#,
        config.text_color, config.greeting
    ))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obtura_core::plugin::Plugin as _;

    #[test]
    fn test_default_config_matches_schema() {
        let plugin = HelloPlugin::new();
        let schema = plugin.config_schema().unwrap();
        assert!(schema.validate(&plugin.default_config()).is_ok());
    }

    #[tokio::test]
    async fn test_setting_change_updates_live_config() {
        let plugin = HelloPlugin::new();
        plugin
            .on_setting_change("greeting", &json!("Hello from Obtura!"), &json!("Hi there"))
            .await
            .unwrap();
        plugin
            .on_setting_change("show_timestamp", &json!(false), &json!(true))
            .await
            .unwrap();

        let config = plugin.config();
        assert_eq!(config.greeting, "Hi there");
        assert!(config.show_timestamp);
    }

    #[tokio::test]
    async fn test_unknown_setting_is_ignored() {
        let plugin = HelloPlugin::new();
        plugin
            .on_setting_change("font_size", &Value::Null, &json!(12))
            .await
            .unwrap();
        assert_eq!(plugin.config().greeting, "Hello from Obtura!");
    }
}
