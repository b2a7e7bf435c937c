//! # Obtura Auth
//!
//! The authentication plugin: the one plugin capability the runtime treats
//! as a first-class coordinator. It keeps a table of [`AuthProvider`]s keyed
//! by name with exactly one *active* at a time, serves the login/logout
//! routes, and exposes two middleware factories the host wires into the
//! router: [`AuthPlugin::middleware`] (require any authenticated user) and
//! [`AuthPlugin::require_admin`] (require the `admin` role).
//!
//! Two providers register by default: the signed-cookie [`SessionProvider`]
//! and [`NoAuthProvider`] for hosts that run with auth disabled.
//!
//! ```rust,ignore
//! let auth = Arc::new(AuthPlugin::new());
//! registry.register(auth.clone())?;
//! registry.set_admin_guard(auth.require_admin());
//! ```

pub mod session;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Form, FromRequest, Query};
use axum::http::header::SET_COOKIE;
use axum::http::{Request, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use obtura_core::auth::{AuthProvider, NoAuthProvider};
use obtura_core::context::PluginContext;
use obtura_core::error::{AuthError, PluginResult};
use obtura_core::plugin::{
    AdminPages, ConfigMap, Plugin, PluginInfo, Routable,
};
use obtura_core::route::{NavItem, Route, RouteMiddleware};
use obtura_core::schema::{ConfigField, ConfigSchema, FieldType, FieldValidation};

pub use session::{SessionProvider, SessionUser, SESSION_COOKIE};

/// Plugin id of the auth plugin.
pub const AUTH_PLUGIN_ID: &str = "com.obtura.auth";

/// Auth plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the provider to activate at startup.
    pub active_provider: String,
    /// Secret used to sign session cookies.
    pub session_secret: String,
    /// Session lifetime in seconds.
    pub session_max_age: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            active_provider: "session".to_string(),
            session_secret: "dev-secret-change-in-production".to_string(),
            session_max_age: 86400 * 7,
        }
    }
}

struct AuthState {
    providers: RwLock<HashMap<String, Arc<dyn AuthProvider>>>,
    active: RwLock<String>,
    session: RwLock<Option<SessionProvider>>,
    /// Runtime facade captured during `initialize`; used to write the
    /// provider choice through the config store.
    context: RwLock<Option<PluginContext>>,
}

impl AuthState {
    /// The active provider, falling back to no-auth when the configured
    /// name has no registered provider.
    fn active_provider(&self) -> Arc<dyn AuthProvider> {
        let name = self.active.read().clone();
        self.providers
            .read()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Arc::new(NoAuthProvider))
    }

    /// Switches the active provider and persists the choice.
    async fn switch_provider(&self, name: &str) -> Result<(), AuthError> {
        if !self.providers.read().contains_key(name) {
            return Err(AuthError::UnknownProvider(name.to_string()));
        }
        *self.active.write() = name.to_string();
        self.persist_active(name).await
    }

    /// Writes the active-provider choice through the config store so it
    /// survives a restart. A no-op before `initialize` has run.
    async fn persist_active(&self, name: &str) -> Result<(), AuthError> {
        let context = self.context.read().clone();
        let Some(context) = context else {
            return Ok(());
        };

        let mut config = context.config().await.unwrap_or_default();
        config.insert("active_provider".to_string(), json!(name));
        context
            .update_config(config)
            .await
            .map_err(|error| AuthError::Persistence(error.to_string()))
    }
}

/// The authentication plugin.
pub struct AuthPlugin {
    state: Arc<AuthState>,
}

impl AuthPlugin {
    /// Creates the plugin. Providers are registered during `initialize`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AuthState {
                providers: RwLock::new(HashMap::new()),
                active: RwLock::new("session".to_string()),
                session: RwLock::new(None),
                context: RwLock::new(None),
            }),
        }
    }

    /// Registers an auth provider. Fails on a duplicate name.
    pub fn register_provider(&self, provider: Arc<dyn AuthProvider>) -> Result<(), AuthError> {
        let name = provider.name().to_string();
        let mut providers = self.state.providers.write();
        if providers.contains_key(&name) {
            return Err(AuthError::DuplicateProvider(name));
        }
        providers.insert(name, provider);
        Ok(())
    }

    /// Returns the provider registered under `name`.
    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn AuthProvider>> {
        self.state.providers.read().get(name).cloned()
    }

    /// The currently active provider.
    pub fn active_provider(&self) -> Arc<dyn AuthProvider> {
        self.state.active_provider()
    }

    /// Switches the active provider and persists the choice into the
    /// plugin's config. Fails on an unknown name.
    pub async fn set_active_provider(&self, name: &str) -> Result<(), AuthError> {
        self.state.switch_provider(name).await
    }

    /// Names of all registered providers.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The session provider, once `initialize` has built it.
    pub fn session_provider(&self) -> Option<SessionProvider> {
        self.state.session.read().clone()
    }

    /// Middleware requiring any authenticated user, built from the provider
    /// active at the time of the call.
    pub fn middleware(&self) -> RouteMiddleware {
        self.state.active_provider().require_auth()
    }

    /// Middleware requiring the `admin` role, built from the provider
    /// active at the time of the call.
    pub fn require_admin(&self) -> RouteMiddleware {
        self.state.active_provider().require_role(&["admin"])
    }
}

impl Default for AuthPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AuthPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: AUTH_PLUGIN_ID,
            name: "Authentication",
            version: "1.0.0",
            description: "Provides authentication and authorization",
            author: "Obtura Team",
        }
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        let config: AuthConfig = ctx.typed_config().await.unwrap_or_default();
        *self.state.context.write() = Some(ctx.clone());

        let session = SessionProvider::new(&config.session_secret, config.session_max_age);
        *self.state.session.write() = Some(session.clone());

        self.register_provider(Arc::new(session))?;
        self.register_provider(Arc::new(NoAuthProvider))?;

        if let Err(error) = self.set_active_provider(&config.active_provider).await {
            warn!(
                provider = %config.active_provider,
                error = %error,
                "configured auth provider unavailable, requests fall back to no-auth"
            );
        }
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        // Seed the initial admin account so a fresh install is reachable.
        if *self.state.active.read() == "session" {
            if let Some(session) = self.session_provider() {
                if !session.has_user("admin@example.com") {
                    session.add_user("admin@example.com", "Admin User", "admin123", "admin")?;
                    info!(email = "admin@example.com", "created initial admin user");
                }
            }
        }
        Ok(())
    }

    fn default_config(&self) -> ConfigMap {
        match serde_json::to_value(AuthConfig::default()) {
            Ok(Value::Object(map)) => map,
            _ => ConfigMap::new(),
        }
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(ConfigSchema::new([
            ConfigField::new("active_provider", FieldType::String)
                .label("Active Provider")
                .description("Name of the authentication provider used for all requests")
                .default_value(json!("session"))
                .required(),
            ConfigField::new("session_secret", FieldType::String)
                .label("Session Secret")
                .description("Secret used to sign session cookies")
                .validation(FieldValidation {
                    min_len: Some(8),
                    ..Default::default()
                })
                .required(),
            ConfigField::new("session_max_age", FieldType::Number)
                .label("Session Lifetime")
                .description("Session lifetime in seconds")
                .validation(FieldValidation {
                    min: Some(60.0),
                    ..Default::default()
                })
                .default_value(json!(86400 * 7)),
        ]))
    }

    fn as_routable(&self) -> Option<&dyn Routable> {
        Some(self)
    }

    fn as_admin(&self) -> Option<&dyn AdminPages> {
        Some(self)
    }
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "return")]
    return_to: String,
}

#[derive(Deserialize)]
struct ProviderForm {
    provider: String,
}

impl Routable for AuthPlugin {
    fn routes(&self) -> Vec<Route> {
        let state = Arc::clone(&self.state);
        let login_page_state = Arc::clone(&self.state);
        let logout_state = Arc::clone(&self.state);

        vec![
            Route::get("/login", move |request| {
                let state = Arc::clone(&login_page_state);
                async move { show_login(state, request).await }
            }),
            Route::post("/login", move |request| {
                let state = Arc::clone(&state);
                async move { handle_login(state, request).await }
            }),
            Route::post("/logout", move |request| {
                let state = Arc::clone(&logout_state);
                async move { handle_logout(state, request).await }
            }),
        ]
    }
}

impl AdminPages for AuthPlugin {
    fn admin_routes(&self) -> Vec<Route> {
        let status_state = Arc::clone(&self.state);
        let switch_state = Arc::clone(&self.state);

        vec![
            Route::get("/auth", move |_request| {
                let state = Arc::clone(&status_state);
                async move { show_provider_status(state).await }
            }),
            Route::post("/auth/provider", move |request| {
                let state = Arc::clone(&switch_state);
                async move { handle_provider_switch(state, request).await }
            }),
        ]
    }

    fn admin_navigation(&self) -> Vec<NavItem> {
        vec![NavItem {
            title: "Authentication".to_string(),
            path: "/admin/auth".to_string(),
            icon: "shield".to_string(),
            order: 100,
            children: Vec::new(),
        }]
    }
}

// ─── Route handlers ───────────────────────────────────────────────────────

async fn show_login(state: Arc<AuthState>, request: Request<Body>) -> Response {
    let provider = state.active_provider();
    if provider.is_authenticated(&request) {
        return Redirect::to("/admin").into_response();
    }

    let return_to = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|q| q.0.get("return").cloned())
        .unwrap_or_else(|| "/admin".to_string());
    Html(login_page(None, &return_to)).into_response()
}

async fn handle_login(state: Arc<AuthState>, request: Request<Body>) -> Response {
    let form = match Form::<LoginForm>::from_request(request, &()).await {
        Ok(Form(form)) => form,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let return_to = if form.return_to.is_empty() {
        "/admin".to_string()
    } else {
        form.return_to
    };

    let mut credentials = ConfigMap::new();
    credentials.insert("email".to_string(), json!(form.email));
    credentials.insert("password".to_string(), json!(form.password));

    let provider = state.active_provider();
    let user = match provider.authenticate(&credentials).await {
        Ok(user) => user,
        Err(error) => {
            let message = match error {
                AuthError::InvalidCredentials => "Invalid email or password",
                AuthError::UserInactive => "Your account has been deactivated",
                _ => "An error occurred during login",
            };
            return (
                StatusCode::UNAUTHORIZED,
                Html(login_page(Some(message), &return_to)),
            )
                .into_response();
        }
    };

    match provider.login(&*user) {
        Ok(cookie) => {
            let mut response = Redirect::to(&return_to).into_response();
            if let Some(cookie) = cookie {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }
            response
        }
        Err(error) => {
            warn!(error = %error, "failed to establish session");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(login_page(Some("Failed to create session"), &return_to)),
            )
                .into_response()
        }
    }
}

async fn handle_logout(state: Arc<AuthState>, _request: Request<Body>) -> Response {
    let provider = state.active_provider();
    let mut response = Redirect::to("/login").into_response();
    if let Some(cookie) = provider.logout() {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

async fn show_provider_status(state: Arc<AuthState>) -> Response {
    let active = state.active.read().clone();
    let mut names: Vec<String> = state.providers.read().keys().cloned().collect();
    names.sort();

    let rows: String = names
        .iter()
        .map(|name| {
            let marker = if *name == active { " (active)" } else { "" };
            format!(
                r#"<li>{name}{marker}
                <form method="post" action="/admin/auth/provider" style="display:inline">
                    <input type="hidden" name="provider" value="{name}">
                    <button type="submit">activate</button>
                </form></li>"#
            )
        })
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authentication</title></head>
<body>
    <h1>Authentication Providers</h1>
    <ul>{rows}</ul>
    <p><a href="/admin">Back to Admin</a></p>
</body>
</html>"#
    ))
    .into_response()
}

async fn handle_provider_switch(state: Arc<AuthState>, request: Request<Body>) -> Response {
    let form = match Form::<ProviderForm>::from_request(request, &()).await {
        Ok(Form(form)) => form,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match state.switch_provider(&form.provider).await {
        Ok(()) => {
            info!(provider = %form.provider, "active auth provider changed");
            Redirect::to("/admin/auth").into_response()
        }
        Err(error @ AuthError::UnknownProvider(_)) => {
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
        Err(error) => {
            warn!(provider = %form.provider, error = %error,
                "failed to persist provider switch");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

fn login_page(error: Option<&str>, return_to: &str) -> String {
    let error_html = error
        .map(|message| format!(r#"<p class="error">{message}</p>"#))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Sign In</title>
    <style>
        body {{ font-family: sans-serif; display: flex; justify-content: center; margin-top: 10vh; }}
        form {{ display: flex; flex-direction: column; gap: 0.75rem; width: 20rem; }}
        .error {{ color: #b00020; }}
    </style>
</head>
<body>
    <form method="post" action="/login">
        <h1>Sign In</h1>
        {error_html}
        <input type="email" name="email" placeholder="Email" required>
        <input type="password" name="password" placeholder="Password" required>
        <input type="hidden" name="return" value="{return_to}">
        <button type="submit">Sign In</button>
    </form>
</body>
</html>"#
    )
}
