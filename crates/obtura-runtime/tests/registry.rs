//! Registry integration tests: registration invariants, dependency-ordered
//! lifecycle, hook chaining, event dispatch, and deferred route binding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use obtura_core::context::PluginContext;
use obtura_core::error::{PluginResult, RegistryError};
use obtura_core::event::{Event, EventHandler};
use obtura_core::hook::HookHandler;
use obtura_core::plugin::{
    ConfigMap, Hookable, Plugin, PluginInfo, PluginState, Routable, ServiceHandle,
    ServiceProvider, Settings, Subscriber,
};
use obtura_core::route::Route;
use obtura_core::schema::{ConfigField, ConfigSchema, FieldType, FieldValidation};
use obtura_runtime::Registry;

fn info_for(id: &'static str) -> PluginInfo {
    PluginInfo {
        id,
        name: id,
        version: "0.1.0",
        description: "test plugin",
        author: "tests",
    }
}

fn as_map(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn status_of(router: Router, path: &str) -> StatusCode {
    router
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

/// Records lifecycle calls into a shared log, optionally failing a phase.
struct LifecyclePlugin {
    id: &'static str,
    deps: Vec<&'static str>,
    log: Arc<Mutex<Vec<String>>>,
    fail_initialize: bool,
    fail_stop: bool,
}

impl LifecyclePlugin {
    fn new(id: &'static str, deps: Vec<&'static str>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id,
            deps,
            log,
            fail_initialize: false,
            fail_stop: false,
        }
    }

    fn record(&self, phase: &str) {
        self.log.lock().unwrap().push(format!("{phase}:{}", self.id));
    }
}

#[async_trait]
impl Plugin for LifecyclePlugin {
    fn info(&self) -> PluginInfo {
        info_for(self.id)
    }

    fn dependencies(&self) -> Vec<&'static str> {
        self.deps.clone()
    }

    async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<()> {
        if self.fail_initialize {
            return Err("initialize refused".into());
        }
        self.record("init");
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record("start");
        Ok(())
    }

    async fn stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        if self.fail_stop {
            return Err("stop refused".into());
        }
        self.record("stop");
        Ok(())
    }
}

// ─── Registration invariants ──────────────────────────────────────────────

#[tokio::test]
async fn duplicate_id_is_refused() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();

    registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log.clone())))
        .unwrap();
    let err = registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log)))
        .unwrap_err();

    assert!(matches!(err, RegistryError::DuplicateId(id) if id == "com.test.a"));
    assert_eq!(registry.list().len(), 1);
}

#[tokio::test]
async fn missing_dependency_is_refused() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();

    let err = registry
        .register(Arc::new(LifecyclePlugin::new(
            "com.test.b",
            vec!["com.test.a"],
            log,
        )))
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::MissingDependency { plugin, dependency }
            if plugin == "com.test.b" && dependency == "com.test.a"
    ));
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn get_unknown_plugin_is_not_found() {
    let registry = Registry::new();
    assert!(matches!(
        registry.get("com.test.absent"),
        Err(RegistryError::NotFound(_))
    ));
}

// ─── Lifecycle ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_runs_dependencies_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();

    // Register the dependent first: ordering must come from the dependency
    // graph, not from registration order.
    registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log.clone())))
        .unwrap();
    registry
        .register(Arc::new(LifecyclePlugin::new(
            "com.test.b",
            vec!["com.test.a"],
            log.clone(),
        )))
        .unwrap();

    registry.initialize().await.unwrap();
    registry.start(CancellationToken::new()).await.unwrap();

    let entries = log.lock().unwrap().clone();
    let pos = |needle: &str| entries.iter().position(|e| e == needle).unwrap();
    assert!(pos("init:com.test.a") < pos("init:com.test.b"));
    assert!(pos("start:com.test.a") < pos("start:com.test.b"));

    assert!(registry.is_enabled("com.test.a"));
    assert!(registry.is_enabled("com.test.b"));
}

#[tokio::test]
async fn initialize_is_idempotent_per_plugin() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log.clone())))
        .unwrap();

    registry.initialize().await.unwrap();
    registry.initialize().await.unwrap();

    let inits = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with("init:"))
        .count();
    assert_eq!(inits, 1);
}

#[tokio::test]
async fn failed_initialize_aborts_bootstrap() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();

    registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log.clone())))
        .unwrap();
    let mut failing = LifecyclePlugin::new("com.test.b", vec!["com.test.a"], log.clone());
    failing.fail_initialize = true;
    registry.register(Arc::new(failing)).unwrap();

    let err = registry.initialize().await.unwrap_err();
    assert!(matches!(err, RegistryError::Initialize { plugin, .. } if plugin == "com.test.b"));

    // The dependency keeps its advanced state.
    assert_eq!(registry.state("com.test.a"), Some(PluginState::Initialized));
    assert_eq!(registry.state("com.test.b"), Some(PluginState::Registered));
}

#[tokio::test]
async fn start_requires_initialize() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(Arc::new(LifecyclePlugin::new("com.test.a", vec![], log)))
        .unwrap();

    let err = registry.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Start { plugin, .. } if plugin == "com.test.a"));
}

#[tokio::test]
async fn stop_reverses_order_and_aggregates_failures() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();

    let mut failing = LifecyclePlugin::new("com.test.a", vec![], log.clone());
    failing.fail_stop = true;
    registry.register(Arc::new(failing)).unwrap();
    registry
        .register(Arc::new(LifecyclePlugin::new(
            "com.test.b",
            vec!["com.test.a"],
            log.clone(),
        )))
        .unwrap();

    registry.initialize().await.unwrap();
    registry.start(CancellationToken::new()).await.unwrap();

    let err = registry.stop().await.unwrap_err();
    match err {
        RegistryError::Stop(stop) => {
            assert_eq!(stop.failures.len(), 1);
            assert_eq!(stop.failures[0].0, "com.test.a");
        }
        other => panic!("expected stop aggregate, got {other}"),
    }

    // The dependent stopped before its dependency, and both left Started.
    let entries = log.lock().unwrap().clone();
    assert!(entries.contains(&"stop:com.test.b".to_string()));
    assert_eq!(registry.state("com.test.a"), Some(PluginState::Stopped));
    assert_eq!(registry.state("com.test.b"), Some(PluginState::Stopped));
    assert!(!registry.is_enabled("com.test.a"));
}

// ─── Services ─────────────────────────────────────────────────────────────

struct CacheService {
    hits: AtomicUsize,
}

struct CachePlugin {
    service: Arc<CacheService>,
}

impl CachePlugin {
    fn new() -> Self {
        Self {
            service: Arc::new(CacheService {
                hits: AtomicUsize::new(0),
            }),
        }
    }
}

#[async_trait]
impl Plugin for CachePlugin {
    fn info(&self) -> PluginInfo {
        info_for("com.test.cache")
    }

    fn as_service(&self) -> Option<&dyn ServiceProvider> {
        Some(self)
    }
}

impl ServiceProvider for CachePlugin {
    fn service(&self) -> ServiceHandle {
        self.service.clone()
    }
}

#[tokio::test]
async fn services_are_published_under_the_plugin_id() {
    let registry = Registry::new();
    registry.register(Arc::new(CachePlugin::new())).unwrap();

    assert!(registry.get_service("com.test.cache").is_some());
    assert!(registry.get_service("com.test.absent").is_none());

    let service = registry.service_as::<CacheService>("com.test.cache").unwrap();
    service.hits.fetch_add(1, Ordering::Relaxed);
    assert_eq!(service.hits.load(Ordering::Relaxed), 1);

    // A mismatched downcast fails cleanly.
    assert!(registry.service_as::<String>("com.test.cache").is_none());
}

// ─── Hooks ────────────────────────────────────────────────────────────────

struct HookPlugin {
    id: &'static str,
    tag: &'static str,
    fail: bool,
}

#[async_trait]
impl Plugin for HookPlugin {
    fn info(&self) -> PluginInfo {
        info_for(self.id)
    }

    fn as_hookable(&self) -> Option<&dyn Hookable> {
        Some(self)
    }
}

impl Hookable for HookPlugin {
    fn hooks(&self) -> Vec<(String, HookHandler)> {
        let tag = self.tag;
        let fail = self.fail;
        vec![(
            "before_save".to_string(),
            HookHandler::new(move |value| async move {
                if fail {
                    return Err("handler refused".into());
                }
                let s = value.as_str().unwrap_or_default();
                Ok(Value::String(format!("{s}|{tag}")))
            }),
        )]
    }
}

#[tokio::test]
async fn hooks_chain_in_registration_order() {
    let registry = Registry::new();
    registry
        .register(Arc::new(HookPlugin {
            id: "com.test.hook_a",
            tag: "A",
            fail: false,
        }))
        .unwrap();
    registry
        .register(Arc::new(HookPlugin {
            id: "com.test.hook_b",
            tag: "B",
            fail: false,
        }))
        .unwrap();

    let out = registry
        .trigger_hook("before_save", json!("x"))
        .await
        .unwrap();
    assert_eq!(out, json!("x|A|B"));
}

#[tokio::test]
async fn hook_failure_halts_chain_and_keeps_last_value() {
    let registry = Registry::new();
    registry
        .register(Arc::new(HookPlugin {
            id: "com.test.hook_a",
            tag: "A",
            fail: false,
        }))
        .unwrap();
    registry
        .register(Arc::new(HookPlugin {
            id: "com.test.hook_b",
            tag: "B",
            fail: true,
        }))
        .unwrap();

    let err = registry
        .trigger_hook("before_save", json!("x"))
        .await
        .unwrap_err();
    assert_eq!(err.plugin, "com.test.hook_b");
    assert_eq!(err.last_value, json!("x|A"));
}

#[tokio::test]
async fn unknown_hook_returns_input_unchanged() {
    let registry = Registry::new();
    let out = registry.trigger_hook("no_such_hook", json!(41)).await.unwrap();
    assert_eq!(out, json!(41));
}

// ─── Events ───────────────────────────────────────────────────────────────

struct CounterPlugin {
    seen: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl Plugin for CounterPlugin {
    fn info(&self) -> PluginInfo {
        info_for("com.test.counter")
    }

    fn as_subscriber(&self) -> Option<&dyn Subscriber> {
        Some(self)
    }
}

impl Subscriber for CounterPlugin {
    fn event_handlers(&self) -> Vec<(String, EventHandler)> {
        let seen = self.seen.clone();
        let delay = self.delay;
        vec![(
            "ping".to_string(),
            EventHandler::new(move |_event| {
                let seen = seen.clone();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )]
    }
}

#[tokio::test]
async fn events_are_delivered_to_subscribers() {
    let seen = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    registry
        .register(Arc::new(CounterPlugin {
            seen: seen.clone(),
            delay: Duration::ZERO,
        }))
        .unwrap();

    registry.initialize().await.unwrap();
    let token = CancellationToken::new();
    registry.start(token.clone()).await.unwrap();

    registry.emit_event(Event::from_plugin("ping", "com.test", json!({})));

    // Best-effort delivery: poll until the handler ran.
    for _ in 0..100 {
        if seen.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    token.cancel();
}

#[tokio::test]
async fn emit_never_blocks_and_drops_when_full() {
    let seen = Arc::new(AtomicUsize::new(0));
    // Small queue, dispatcher intentionally not started: every emit must
    // still return immediately.
    let registry = Registry::builder().event_capacity(4).build();
    registry
        .register(Arc::new(CounterPlugin {
            seen,
            delay: Duration::from_millis(100),
        }))
        .unwrap();

    for _ in 0..10 {
        registry.emit_event(Event::from_plugin("ping", "com.test", json!({})));
    }

    assert_eq!(registry.dropped_events(), 6);
}

// ─── Routes ───────────────────────────────────────────────────────────────

struct PagesPlugin;

#[async_trait]
impl Plugin for PagesPlugin {
    fn info(&self) -> PluginInfo {
        info_for("com.test.pages")
    }

    fn as_routable(&self) -> Option<&dyn Routable> {
        Some(self)
    }
}

impl Routable for PagesPlugin {
    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("/hello", |_req| async { "hello".into_response() }),
            Route::get("/world", |_req| async { "world".into_response() }),
        ]
    }
}

#[tokio::test]
async fn routes_bind_only_after_router_attachment() {
    let registry = Registry::new();
    registry.register(Arc::new(PagesPlugin)).unwrap();

    // Before attachment the host router knows nothing about the plugin.
    let base = Router::new();
    assert_eq!(status_of(base.clone(), "/hello").await, StatusCode::NOT_FOUND);

    registry.set_router(base);
    let router = registry.take_router().unwrap();
    assert_eq!(status_of(router.clone(), "/hello").await, StatusCode::OK);
    assert_eq!(status_of(router, "/world").await, StatusCode::OK);
}

#[tokio::test]
async fn routes_bind_exactly_once() {
    let registry = Registry::new();
    registry.register(Arc::new(PagesPlugin)).unwrap();

    registry.set_router(Router::new());
    let first = registry.take_router().unwrap();
    assert_eq!(status_of(first, "/hello").await, StatusCode::OK);

    // The queue was drained; a fresh router gets nothing.
    registry.set_router(Router::new());
    let second = registry.take_router().unwrap();
    assert_eq!(status_of(second, "/hello").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_after_attachment_binds_immediately() {
    let registry = Registry::new();
    registry.set_router(Router::new());

    registry.register(Arc::new(PagesPlugin)).unwrap();

    let router = registry.take_router().unwrap();
    assert_eq!(status_of(router, "/hello").await, StatusCode::OK);
}

// ─── Config through the registry ──────────────────────────────────────────

struct PortPlugin;

#[async_trait]
impl Plugin for PortPlugin {
    fn info(&self) -> PluginInfo {
        info_for("com.test.port")
    }

    fn default_config(&self) -> ConfigMap {
        as_map(json!({"port": 8080}))
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(ConfigSchema::new([ConfigField::new("port", FieldType::Number)
            .required()
            .validation(FieldValidation {
                min: Some(1.0),
                max: Some(65535.0),
                ..Default::default()
            })]))
    }
}

#[tokio::test]
async fn rejected_config_keeps_prior_value() {
    let registry = Registry::new();
    registry.register(Arc::new(PortPlugin)).unwrap();

    // Default materializes on first read.
    let before = registry.get_config("com.test.port").await.unwrap();
    assert_eq!(before["port"], json!(8080));

    let err = registry
        .set_config("com.test.port", as_map(json!({"port": 70000})))
        .await
        .unwrap_err();
    match err {
        RegistryError::Config(config_err) => {
            assert!(config_err.to_string().contains("'port'"));
        }
        other => panic!("expected config error, got {other}"),
    }

    let after = registry.get_config("com.test.port").await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn default_config_is_stable_across_reads() {
    let registry = Registry::new();
    registry.register(Arc::new(PortPlugin)).unwrap();

    let first = registry.get_config("com.test.port").await.unwrap();
    let second = registry.get_config("com.test.port").await.unwrap();
    assert_eq!(first, second);
}

// ─── Settings notifications ───────────────────────────────────────────────

struct NotifyPlugin {
    changes: Arc<Mutex<Vec<(String, Value, Value)>>>,
}

#[async_trait]
impl Plugin for NotifyPlugin {
    fn info(&self) -> PluginInfo {
        info_for("com.test.notify")
    }

    fn default_config(&self) -> ConfigMap {
        as_map(json!({"greeting": "hi", "color": "blue"}))
    }

    fn as_settings(&self) -> Option<&dyn Settings> {
        Some(self)
    }
}

#[async_trait]
impl Settings for NotifyPlugin {
    fn settings(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("greeting", FieldType::String),
            ConfigField::new("color", FieldType::String),
        ]
    }

    async fn on_setting_change(&self, key: &str, old: &Value, new: &Value) -> PluginResult<()> {
        self.changes
            .lock()
            .unwrap()
            .push((key.to_string(), old.clone(), new.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn settings_are_notified_of_changed_keys_only() {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(Arc::new(NotifyPlugin {
            changes: changes.clone(),
        }))
        .unwrap();

    registry
        .set_config(
            "com.test.notify",
            as_map(json!({"greeting": "hello", "color": "blue"})),
        )
        .await
        .unwrap();

    let recorded = changes.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, "greeting");
    assert_eq!(recorded[0].1, json!("hi"));
    assert_eq!(recorded[0].2, json!("hello"));
}
