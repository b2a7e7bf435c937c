//! The plugin registry: the single source of truth for plugin membership,
//! lifecycle orchestration, and the cross-plugin buses.
//!
//! The registry owns every registered plugin handle for the process lifetime,
//! the service/hook/subscriber tables, the bounded event queue and its
//! dispatcher task, and the deferred route queue. Plugins see it only through
//! the [`RuntimeHandle`] facade.
//!
//! # Locking
//!
//! One reader/writer lock guards the internal tables. Lookups take the read
//! lock, mutations the write lock, and **no plugin-authored code ever runs
//! while the lock is held**: contributions are gathered before the lock is
//! taken and handler lists are snapshotted out of it, so a plugin that calls
//! back into the registry from a lifecycle method or handler cannot deadlock.
//!
//! # Bootstrap order
//!
//! ```rust,ignore
//! let registry = Registry::new();
//! registry.register(Arc::new(CachePlugin::default()))?;
//! registry.register(Arc::new(SitePlugin::default()))?;   // deps: ["com.example.cache"]
//! registry.initialize().await?;
//! registry.start(shutdown_token).await?;
//! registry.set_router(router);                            // binds queued routes
//! let router = registry.take_router().unwrap();           // serve this
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use obtura_core::context::{PluginContext, RuntimeHandle};
use obtura_core::error::{HookError, RegistryError, StopError};
use obtura_core::event::{Event, EventHandler};
use obtura_core::hook::HookHandler;
use obtura_core::plugin::{ConfigMap, Plugin, PluginState, ServiceHandle};
use obtura_core::route::{NavItem, RouteMiddleware};
use obtura_core::schema::ConfigSchema;

use crate::binder::RouteBinder;
use crate::config::{ConfigManager, ConfigStorage, MemoryConfigStorage};
use crate::events;

/// Default capacity of the bounded event queue.
const DEFAULT_EVENT_CAPACITY: usize = 100;

struct Tables {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    /// Registration order; drives hook determinism and stop ordering ties.
    order: Vec<String>,
    /// Dependency lists snapshotted at registration time.
    dependencies: HashMap<String, Vec<String>>,
    states: HashMap<String, PluginState>,
    services: HashMap<String, ServiceHandle>,
    hooks: HashMap<String, Vec<(String, HookHandler)>>,
    subscribers: HashMap<String, Vec<(String, EventHandler)>>,
    middlewares: Vec<RouteMiddleware>,
    binder: RouteBinder,
}

/// The plugin registry. Construct through [`Registry::new`] or
/// [`Registry::builder`], always behind an `Arc`.
pub struct Registry {
    tables: RwLock<Tables>,
    config: Arc<ConfigManager>,
    events_tx: mpsc::Sender<Event>,
    /// Consumed by the dispatcher on the first `start`.
    events_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    dropped_events: AtomicU64,
}

impl Registry {
    /// Creates a registry with in-memory config storage and the default
    /// event queue capacity.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Starts building a registry with custom storage or queue capacity.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn with_options(storage: Box<dyn ConfigStorage>, event_capacity: usize) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(event_capacity);
        Arc::new(Self {
            tables: RwLock::new(Tables {
                plugins: HashMap::new(),
                order: Vec::new(),
                dependencies: HashMap::new(),
                states: HashMap::new(),
                services: HashMap::new(),
                hooks: HashMap::new(),
                subscribers: HashMap::new(),
                middlewares: Vec::new(),
                binder: RouteBinder::new(),
            }),
            config: Arc::new(ConfigManager::with_storage(storage)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            dropped_events: AtomicU64::new(0),
        })
    }

    // ─── Registration ────────────────────────────────────────────────────

    /// Registers a plugin.
    ///
    /// Atomically verifies the id is unused and every declared dependency is
    /// already registered, then stores the plugin, installs its default
    /// config and schema, and wires its service, hook, event, middleware,
    /// route, and admin contributions. Routes are queued until
    /// [`set_router`](Self::set_router) unless a router is already attached.
    ///
    /// Calling `register` from inside a plugin's own `initialize` is not
    /// supported: it will not deadlock, but dependency ordering and route
    /// binding guarantees do not extend to plugins registered mid-bootstrap.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let info = plugin.info();
        let id = info.id.to_string();

        // Gather every contribution before taking the lock, so no
        // plugin-authored code runs while it is held.
        let dependencies: Vec<String> =
            plugin.dependencies().iter().map(|d| d.to_string()).collect();
        let service = plugin.as_service().map(|p| p.service());
        let hooks = plugin.as_hookable().map(|p| p.hooks()).unwrap_or_default();
        let handlers = plugin
            .as_subscriber()
            .map(|p| p.event_handlers())
            .unwrap_or_default();
        let middleware = plugin.as_middleware().map(|p| p.middleware());
        let routes = plugin.as_routable().map(|p| p.routes()).unwrap_or_default();
        let admin_routes = plugin
            .as_admin()
            .map(|p| p.admin_routes())
            .unwrap_or_default();
        let defaults = plugin.default_config();
        let schema = plugin
            .config_schema()
            .unwrap_or_else(|| ConfigSchema::infer(&defaults));

        {
            let mut tables = self.tables.write();

            if tables.plugins.contains_key(&id) {
                return Err(RegistryError::DuplicateId(id));
            }
            for dep in &dependencies {
                if !tables.plugins.contains_key(dep) {
                    return Err(RegistryError::MissingDependency {
                        plugin: id,
                        dependency: dep.clone(),
                    });
                }
            }

            tables.plugins.insert(id.clone(), Arc::clone(&plugin));
            tables.order.push(id.clone());
            tables.dependencies.insert(id.clone(), dependencies);
            tables.states.insert(id.clone(), PluginState::Registered);

            if let Some(handle) = service {
                tables.services.insert(id.clone(), handle);
            }
            for (name, handler) in hooks {
                tables
                    .hooks
                    .entry(name)
                    .or_default()
                    .push((id.clone(), handler));
            }
            for (name, handler) in handlers {
                tables
                    .subscribers
                    .entry(name)
                    .or_default()
                    .push((id.clone(), handler));
            }
            if let Some(middleware) = middleware {
                tables.middlewares.push(middleware);
            }
            for route in routes {
                tables.binder.enqueue(route, false);
            }
            for route in admin_routes {
                tables.binder.enqueue(route, true);
            }
        }

        self.config.set_default(&id, defaults);
        self.config.register_schema(&id, schema);

        info!(plugin = %id, version = %info.version, "plugin registered");
        Ok(())
    }

    // ─── Lookups ─────────────────────────────────────────────────────────

    /// Returns the plugin registered under `id`.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Plugin>, RegistryError> {
        self.tables
            .read()
            .plugins
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns every registered plugin, in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Plugin>> {
        let tables = self.tables.read();
        tables
            .order
            .iter()
            .filter_map(|id| tables.plugins.get(id).cloned())
            .collect()
    }

    /// Returns the opaque service handle published under `id`.
    pub fn get_service(&self, id: &str) -> Option<ServiceHandle> {
        self.tables.read().services.get(id).cloned()
    }

    /// Returns the service published under `id`, downcast to `T`.
    ///
    /// A type mismatch yields `None` rather than panicking.
    pub fn service_as<T: Send + Sync + 'static>(&self, id: &str) -> Option<Arc<T>> {
        self.get_service(id)?.downcast::<T>().ok()
    }

    /// Returns the lifecycle state of the plugin, if registered.
    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.tables.read().states.get(id).copied()
    }

    /// Returns `true` iff the plugin is currently started.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.state(id) == Some(PluginState::Started)
    }

    /// Merged admin navigation entries from all admin plugins, sorted by
    /// their declared order.
    pub fn admin_navigation(&self) -> Vec<NavItem> {
        let plugins = self.list();
        let mut items: Vec<NavItem> = plugins
            .iter()
            .filter_map(|p| p.as_admin())
            .flat_map(|a| a.admin_navigation())
            .collect();
        items.sort_by_key(|item| item.order);
        items
    }

    /// Plugin-contributed global middleware, in registration order.
    pub fn middlewares(&self) -> Vec<RouteMiddleware> {
        self.tables.read().middlewares.clone()
    }

    // ─── Hooks and events ────────────────────────────────────────────────

    /// Runs the handlers registered under `name` as a pipeline, feeding each
    /// handler the previous handler's output.
    ///
    /// Handlers run in registration order without the registry lock held.
    /// The first handler error aborts the chain; the returned [`HookError`]
    /// carries the last successful intermediate value.
    pub async fn trigger_hook(&self, name: &str, value: Value) -> Result<Value, HookError> {
        let handlers: Vec<(String, HookHandler)> = self
            .tables
            .read()
            .hooks
            .get(name)
            .cloned()
            .unwrap_or_default();

        let mut current = value;
        for (plugin, handler) in handlers {
            match handler.call(current.clone()).await {
                Ok(next) => current = next,
                Err(source) => {
                    return Err(HookError {
                        hook: name.to_string(),
                        plugin,
                        last_value: current,
                        source,
                    });
                }
            }
        }
        Ok(current)
    }

    /// Enqueues an event for asynchronous dispatch. Fire-and-forget: when
    /// the queue is full the event is dropped and the drop counter
    /// increments.
    pub fn emit_event(&self, event: Event) {
        if let Err(err) = self.events_tx.try_send(event) {
            let event = err.into_inner();
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            debug!(event = %event.name, "event queue full, event dropped");
        }
    }

    /// Number of events dropped because the queue was full (or the
    /// dispatcher had already shut down).
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Snapshot of the subscribers registered for an event name.
    pub(crate) fn subscribers_for(&self, name: &str) -> Vec<(String, EventHandler)> {
        self.tables
            .read()
            .subscribers
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Initializes every registered plugin in dependency order.
    ///
    /// Idempotent per plugin; the first failure aborts, leaving already
    /// initialized plugins in their state.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), RegistryError> {
        for id in self.dependency_order()? {
            let (plugin, state) = self.plugin_and_state(&id)?;
            if state >= PluginState::Initialized {
                continue;
            }
            let ctx = self.context_for(&id);
            plugin
                .initialize(&ctx)
                .await
                .map_err(|source| RegistryError::Initialize {
                    plugin: id.clone(),
                    source,
                })?;
            self.set_state(&id, PluginState::Initialized);
            debug!(plugin = %id, "plugin initialized");
        }
        Ok(())
    }

    /// Starts every initialized plugin in dependency order and spawns the
    /// event dispatcher bound to `shutdown`.
    ///
    /// Cancelling `shutdown` stops event pickup; in-flight handlers are
    /// allowed to complete. The first start failure aborts bootstrap.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Result<(), RegistryError> {
        for id in self.dependency_order()? {
            let (plugin, state) = self.plugin_and_state(&id)?;
            match state {
                PluginState::Started | PluginState::Stopped => continue,
                PluginState::Registered => {
                    return Err(RegistryError::Start {
                        plugin: id,
                        source: "plugin is not initialized".into(),
                    });
                }
                PluginState::Initialized => {}
            }
            let ctx = self.context_for(&id);
            plugin
                .start(&ctx)
                .await
                .map_err(|source| RegistryError::Start {
                    plugin: id.clone(),
                    source,
                })?;
            self.set_state(&id, PluginState::Started);
            info!(plugin = %id, "plugin started");
        }

        if let Some(rx) = self.events_rx.lock().take() {
            events::spawn_dispatcher(Arc::clone(self), rx, shutdown);
        }
        Ok(())
    }

    /// Stops every started plugin in reverse dependency order.
    ///
    /// Failures do not short-circuit: every started plugin is stopped and
    /// the errors are returned as one aggregate.
    pub async fn stop(self: &Arc<Self>) -> Result<(), RegistryError> {
        let mut order = self.dependency_order()?;
        order.reverse();

        let mut failures = Vec::new();
        for id in order {
            let (plugin, state) = match self.plugin_and_state(&id) {
                Ok(pair) => pair,
                Err(_) => continue,
            };
            if state != PluginState::Started {
                continue;
            }
            let ctx = self.context_for(&id);
            match plugin.stop(&ctx).await {
                Ok(()) => {
                    self.set_state(&id, PluginState::Stopped);
                    info!(plugin = %id, "plugin stopped");
                }
                Err(source) => {
                    warn!(plugin = %id, error = %source, "plugin failed to stop");
                    self.set_state(&id, PluginState::Stopped);
                    failures.push((id, source));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StopError { failures }.into())
        }
    }

    /// Runs every plugin's `destroy` best-effort; errors are logged.
    pub async fn destroy_all(self: &Arc<Self>) {
        for plugin in self.list() {
            let id = plugin.info().id;
            let ctx = self.context_for(id);
            if let Err(error) = plugin.destroy(&ctx).await {
                warn!(plugin = %id, error = %error, "plugin destroy failed");
            }
        }
    }

    // ─── Router attachment ───────────────────────────────────────────────

    /// Attaches the host router and drains the deferred route queue onto it.
    /// Idempotent while a router is held.
    pub fn set_router(&self, router: Router) {
        self.tables.write().binder.attach(router);
    }

    /// Takes the composed router back for serving. Routes registered
    /// afterwards queue until the next [`set_router`](Self::set_router).
    pub fn take_router(&self) -> Option<Router> {
        self.tables.write().binder.take()
    }

    /// Installs the middleware wrapped around admin routes at bind time.
    /// Must be called before the router is attached to cover queued routes.
    pub fn set_admin_guard(&self, guard: RouteMiddleware) {
        self.tables.write().binder.set_admin_guard(guard);
    }

    // ─── Configuration ───────────────────────────────────────────────────

    /// Reads the current configuration document for a plugin.
    ///
    /// Returns the stored document, or the plugin's declared default
    /// (persisted on first access) when nothing is stored yet.
    pub async fn get_config(&self, id: &str) -> Option<ConfigMap> {
        self.config.get(id).await
    }

    /// Validates and persists a configuration document for a plugin, then
    /// notifies the plugin's settings surface of each changed key.
    pub async fn set_config(&self, id: &str, value: ConfigMap) -> Result<(), RegistryError> {
        let plugin = self.get(id)?;
        let old = self.config.get(id).await.unwrap_or_default();
        self.config.set(id, value.clone()).await?;

        if let Some(settings) = plugin.as_settings() {
            for (key, new_value) in &value {
                let old_value = old.get(key).cloned().unwrap_or(Value::Null);
                if old_value != *new_value {
                    if let Err(error) = settings.on_setting_change(key, &old_value, new_value).await
                    {
                        warn!(plugin = %id, key = %key, error = %error,
                            "setting change handler failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// The configuration manager backing this registry.
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn context_for(self: &Arc<Self>, id: &str) -> PluginContext {
        let handle: Arc<dyn RuntimeHandle> = Arc::clone(self) as Arc<dyn RuntimeHandle>;
        PluginContext::new(handle, id)
    }

    fn plugin_and_state(&self, id: &str) -> Result<(Arc<dyn Plugin>, PluginState), RegistryError> {
        let tables = self.tables.read();
        let plugin = tables
            .plugins
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let state = tables
            .states
            .get(id)
            .copied()
            .unwrap_or(PluginState::Registered);
        Ok((plugin, state))
    }

    fn set_state(&self, id: &str, state: PluginState) {
        self.tables.write().states.insert(id.to_string(), state);
    }

    /// Computes a dependency-respecting order over all registered plugins
    /// via a layered topological pass (Kahn's algorithm). Within a layer,
    /// registration order breaks ties, so the result is deterministic for a
    /// fixed registration sequence.
    ///
    /// Registration refuses absent dependencies, so cycles cannot be built
    /// through the public API; the traversal still fails defensively with
    /// [`RegistryError::DependencyCycle`] if one is found.
    fn dependency_order(&self) -> Result<Vec<String>, RegistryError> {
        let tables = self.tables.read();
        let ids = tables.order.clone();
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; ids.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
        for (i, id) in ids.iter().enumerate() {
            for dep in tables.dependencies.get(id).into_iter().flatten() {
                if let Some(&provider) = index.get(dep.as_str()) {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
            }
        }
        drop(tables);

        let mut order = Vec::with_capacity(ids.len());
        let mut current: Vec<usize> = (0..ids.len()).filter(|&i| in_degree[i] == 0).collect();
        while !current.is_empty() {
            current.sort_unstable();
            let mut next = Vec::new();
            for &i in &current {
                order.push(ids[i].clone());
                for &j in &dependents[i] {
                    in_degree[j] -= 1;
                    if in_degree[j] == 0 {
                        next.push(j);
                    }
                }
            }
            current = next;
        }

        if order.len() != ids.len() {
            let cycle: Vec<String> = (0..ids.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| ids[i].clone())
                .collect();
            return Err(RegistryError::DependencyCycle(cycle.join(", ")));
        }
        Ok(order)
    }
}

#[async_trait]
impl RuntimeHandle for Registry {
    fn service(&self, id: &str) -> Option<ServiceHandle> {
        self.get_service(id)
    }

    fn emit_event(&self, event: Event) {
        Registry::emit_event(self, event);
    }

    async fn trigger_hook(&self, name: &str, value: Value) -> Result<Value, HookError> {
        Registry::trigger_hook(self, name, value).await
    }

    async fn config(&self, id: &str) -> Option<ConfigMap> {
        self.get_config(id).await
    }

    async fn set_config(&self, id: &str, value: ConfigMap) -> Result<(), RegistryError> {
        Registry::set_config(self, id, value).await
    }

    fn is_enabled(&self, id: &str) -> bool {
        Registry::is_enabled(self, id)
    }
}

/// Builder for a [`Registry`] with custom storage or event queue capacity.
pub struct RegistryBuilder {
    storage: Option<Box<dyn ConfigStorage>>,
    event_capacity: usize,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            storage: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RegistryBuilder {
    /// Uses the given config storage backend instead of in-memory storage.
    pub fn storage(mut self, storage: Box<dyn ConfigStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the bounded event queue capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Builds the registry.
    pub fn build(self) -> Arc<Registry> {
        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(MemoryConfigStorage::new()));
        Registry::with_options(storage, self.event_capacity)
    }
}
