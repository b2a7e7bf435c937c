//! A small example plugin: in-process page view counting.
//!
//! Demonstrates the middleware capability (one global request wrapper that
//! counts every page view), an admin page showing the counters, and an event
//! subscription so other plugins can report views through the event bus.
//! The counters live behind the plugin's own lock; plugin state is never
//! guarded by the runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{Html, IntoResponse};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use obtura_core::context::PluginContext;
use obtura_core::error::PluginResult;
use obtura_core::event::EventHandler;
use obtura_core::plugin::{
    AdminPages, ConfigMap, HttpMiddleware, Plugin, PluginInfo, Subscriber,
};
use obtura_core::route::{call, handler, NavItem, Route, RouteMiddleware, RouteService};

/// Plugin id of the analytics plugin.
pub const ANALYTICS_PLUGIN_ID: &str = "com.example.analytics";

/// Analytics plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Master switch for tracking.
    pub enabled: bool,
    /// External tracking code, unused by the built-in counter.
    pub tracking_code: String,
    /// Skip requests under `/admin`.
    pub exclude_admin: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracking_code: String::new(),
            exclude_admin: true,
        }
    }
}

/// The analytics plugin.
pub struct AnalyticsPlugin {
    config: Arc<RwLock<AnalyticsConfig>>,
    page_views: Arc<RwLock<HashMap<String, u64>>>,
}

impl AnalyticsPlugin {
    /// Creates the plugin with empty counters.
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AnalyticsConfig::default())),
            page_views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of the per-path view counters.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.page_views.read().clone()
    }

    fn track(views: &RwLock<HashMap<String, u64>>, path: &str) {
        *views.write().entry(path.to_string()).or_insert(0) += 1;
    }
}

impl Default for AnalyticsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AnalyticsPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: ANALYTICS_PLUGIN_ID,
            name: "Simple Analytics",
            version: "1.0.0",
            description: "Basic page view analytics",
            author: "Example Author",
        }
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        if let Ok(config) = ctx.typed_config::<AnalyticsConfig>().await {
            *self.config.write() = config;
        }
        Ok(())
    }

    fn default_config(&self) -> ConfigMap {
        match serde_json::to_value(AnalyticsConfig::default()) {
            Ok(Value::Object(map)) => map,
            _ => ConfigMap::new(),
        }
    }

    fn as_middleware(&self) -> Option<&dyn HttpMiddleware> {
        Some(self)
    }

    fn as_admin(&self) -> Option<&dyn AdminPages> {
        Some(self)
    }

    fn as_subscriber(&self) -> Option<&dyn Subscriber> {
        Some(self)
    }
}

impl HttpMiddleware for AnalyticsPlugin {
    fn middleware(&self) -> RouteMiddleware {
        let config = Arc::clone(&self.config);
        let views = Arc::clone(&self.page_views);
        Arc::new(move |next: RouteService| {
            let config = Arc::clone(&config);
            let views = Arc::clone(&views);
            handler(move |request: Request<Body>| {
                let config = Arc::clone(&config);
                let views = Arc::clone(&views);
                let next = next.clone();
                async move {
                    let path = request.uri().path().to_string();
                    {
                        let config = config.read();
                        if config.enabled && !(config.exclude_admin && path.starts_with("/admin")) {
                            AnalyticsPlugin::track(&views, &path);
                        }
                    }
                    call(next, request).await
                }
            })
        })
    }
}

impl AdminPages for AnalyticsPlugin {
    fn admin_routes(&self) -> Vec<Route> {
        let views = Arc::clone(&self.page_views);
        vec![
            Route::get("/analytics", |_request: Request<Body>| async {
                Html(
                    r#"<!DOCTYPE html>
<html>
<head>
    <title>Analytics</title>
    <style>
        body { font-family: sans-serif; margin: 20px; }
        .stat-item { display: flex; justify-content: space-between; padding: 10px; }
    </style>
</head>
<body>
    <h1>Simple Analytics</h1>
    <div class="stats" data-source="/admin/analytics/api/stats">Loading stats…</div>
    <p><a href="/admin">Back to Admin</a></p>
</body>
</html>"#,
                )
                .into_response()
            }),
            Route::get("/analytics/api/stats", move |_request: Request<Body>| {
                let views = Arc::clone(&views);
                async move {
                    let stats = views.read().clone();
                    if stats.is_empty() {
                        return Html("<p>No page views tracked yet.</p>".to_string())
                            .into_response();
                    }
                    let mut rows: Vec<(String, u64)> = stats.into_iter().collect();
                    rows.sort_by(|a, b| b.1.cmp(&a.1));
                    let html: String = rows
                        .into_iter()
                        .map(|(path, count)| {
                            format!(
                                r#"<div class="stat-item"><span>{path}</span><strong>{count} views</strong></div>"#
                            )
                        })
                        .collect();
                    Html(html).into_response()
                }
            }),
        ]
    }

    fn admin_navigation(&self) -> Vec<NavItem> {
        vec![NavItem {
            title: "Analytics".to_string(),
            path: "/admin/analytics".to_string(),
            icon: "chart".to_string(),
            order: 150,
            children: Vec::new(),
        }]
    }
}

impl Subscriber for AnalyticsPlugin {
    fn event_handlers(&self) -> Vec<(String, EventHandler)> {
        let views = Arc::clone(&self.page_views);
        vec![(
            "page.viewed".to_string(),
            EventHandler::new(move |event| {
                let views = Arc::clone(&views);
                async move {
                    if let Some(path) = event.payload.get("path").and_then(|v| v.as_str()) {
                        AnalyticsPlugin::track(&views, path);
                    }
                    Ok(())
                }
            }),
        )]
    }
}
