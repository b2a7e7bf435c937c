//! Host application orchestration.
//!
//! [`ObturaApp`] wires the pieces together in the order the runtime requires:
//! logging first, then plugin registration, then dependency-ordered
//! `initialize` and `start`, then router attachment (which drains the
//! deferred route queue), then serving. Shutdown runs the sequence in
//! reverse: stop serving, cancel the event dispatcher, `stop` every plugin,
//! and finish with a best-effort `destroy` pass.
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> obtura_runtime::HostResult<()> {
//!     let app = ObturaApp::builder().config_file("obtura.yaml").build()?;
//!     app.register(Arc::new(HelloPlugin::default()))?;
//!     app.run(Router::new()).await
//! }
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use obtura_core::error::RegistryError;
use obtura_core::plugin::Plugin;

use crate::binder::PluginMiddlewareLayer;
use crate::config::JsonFileConfigStorage;
use crate::error::HostResult;
use crate::host::{ConfigLoader, HostConfig};
use crate::logging;
use crate::registry::Registry;

/// The Obtura host application: one registry, one HTTP process.
pub struct ObturaApp {
    config: HostConfig,
    registry: Arc<Registry>,
}

impl ObturaApp {
    /// Creates an app with configuration auto-loaded from the default search
    /// paths; missing or unreadable config falls back to defaults.
    pub fn new() -> Self {
        let config = ConfigLoader::default().load().unwrap_or_else(|error| {
            eprintln!("warning: failed to load config ({error}), using defaults");
            HostConfig::default()
        });
        Self::from_config(config)
    }

    /// Starts building an app with explicit configuration sources.
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Creates an app from an already-loaded configuration.
    ///
    /// Initializes logging and builds the registry with file-backed config
    /// storage rooted at `config_dir`; if the directory cannot be created
    /// the registry falls back to in-memory storage.
    pub fn from_config(config: HostConfig) -> Self {
        logging::init_from_config(&config.logging);

        let registry = match JsonFileConfigStorage::new(&config.config_dir) {
            Ok(storage) => Registry::builder().storage(Box::new(storage)).build(),
            Err(error) => {
                warn!(
                    dir = %config.config_dir.display(),
                    error = %error,
                    "config directory unavailable, falling back to in-memory storage"
                );
                Registry::new()
            }
        };

        Self { config, registry }
    }

    /// The loaded host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The registry owned by this app.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Registers a plugin. Order matters only for dependency checks.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        self.registry.register(plugin)
    }

    /// Bootstraps, serves until ctrl-c or SIGTERM, then shuts down.
    ///
    /// `router` is the host's base router (home page, static files, …);
    /// plugin routes are drained onto it before serving.
    pub async fn run(&self, router: Router) -> HostResult<()> {
        self.run_until(router, shutdown_signal()).await
    }

    /// Like [`run`](Self::run) with a custom shutdown future.
    pub async fn run_until<F>(&self, router: Router, shutdown: F) -> HostResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();

        self.registry.initialize().await?;
        self.registry.start(token.clone()).await?;

        // Attach the router: this drains the deferred route queue. Global
        // layers go on afterwards so they wrap every bound route.
        self.registry.set_router(router);
        let mut router = self.registry.take_router().unwrap_or_default();
        for middleware in self.registry.middlewares() {
            router = router.layer(PluginMiddlewareLayer::new(middleware));
        }
        let router = router.layer(TraceLayer::new_for_http());

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, "obtura listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("shutting down");
        token.cancel();
        let stopped = self.registry.stop().await;
        self.registry.destroy_all().await;
        stopped?;
        Ok(())
    }
}

impl Default for ObturaApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when ctrl-c (or SIGTERM on unix) is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(error) => {
                warn!(error = %error, "failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => info!("received ctrl-c"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

/// Builder for an [`ObturaApp`] with explicit configuration sources.
pub struct AppBuilder {
    loader: ConfigLoader,
    config_file: Option<std::path::PathBuf>,
}

impl AppBuilder {
    /// Creates a builder searching the current directory by default.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new().with_current_dir(),
            config_file: None,
        }
    }

    /// Loads configuration from a specific file instead of searching.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    /// Builds the app.
    pub fn build(self) -> HostResult<ObturaApp> {
        let config = match &self.config_file {
            Some(path) => self.loader.load_from_file(path)?,
            None => self.loader.load()?,
        };
        Ok(ObturaApp::from_config(config))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
