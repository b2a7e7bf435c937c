//! The signed-cookie session provider.
//!
//! Keeps an in-process user store (email keyed, salted password hashes) and
//! establishes sessions through one HttpOnly cookie whose value is a signed
//! `user-id:expiry` payload. The request path never touches storage beyond
//! the in-memory map, so session recognition is synchronous.
//!
//! The cookie format is `base64(payload).base64(sha256(secret:payload))`;
//! tampering with either half invalidates the signature, and an expired
//! payload is rejected even with a valid signature.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HeaderValue, COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Redirect};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use obtura_core::auth::{AuthProvider, AuthUser, CurrentUser};
use obtura_core::error::AuthError;
use obtura_core::plugin::ConfigMap;
use obtura_core::route::{call, handler, RouteMiddleware, RouteService};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "obtura_session";

/// A user account held by the session provider.
#[derive(Debug, Clone)]
struct StoredUser {
    id: String,
    email: String,
    name: String,
    role: String,
    password_hash: String,
    salt: String,
    active: bool,
}

/// An authenticated session user.
#[derive(Debug, Clone)]
pub struct SessionUser {
    id: String,
    email: String,
    name: String,
    role: String,
}

impl AuthUser for SessionUser {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn email(&self) -> String {
        self.email.clone()
    }
    fn name(&self) -> String {
        self.name.clone()
    }
    fn role(&self) -> String {
        self.role.clone()
    }
    fn permissions(&self) -> Vec<String> {
        if self.role == "admin" {
            vec!["*".to_string()]
        } else {
            Vec::new()
        }
    }
}

impl From<&StoredUser> for SessionUser {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
        }
    }
}

struct SessionInner {
    users: RwLock<HashMap<String, StoredUser>>,
    next_id: RwLock<u64>,
    secret: String,
    max_age: u64,
}

/// Email/password provider with signed-cookie sessions.
#[derive(Clone)]
pub struct SessionProvider {
    inner: Arc<SessionInner>,
}

impl SessionProvider {
    /// Creates a provider signing sessions with `secret`, valid for
    /// `max_age` seconds.
    pub fn new(secret: impl Into<String>, max_age: u64) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                users: RwLock::new(HashMap::new()),
                next_id: RwLock::new(1),
                secret: secret.into(),
                max_age,
            }),
        }
    }

    /// Adds a user account. Fails if the email is already taken.
    pub fn add_user(
        &self,
        email: impl Into<String>,
        name: impl Into<String>,
        password: &str,
        role: impl Into<String>,
    ) -> Result<(), AuthError> {
        let email = email.into();
        let mut users = self.inner.users.write();
        if users.contains_key(&email) {
            return Err(AuthError::Session(format!("user {email} already exists")));
        }

        let id = {
            let mut next = self.inner.next_id.write();
            let id = *next;
            *next += 1;
            id.to_string()
        };
        let salt = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>());
        let password_hash = hash_password(&salt, password);
        users.insert(
            email.clone(),
            StoredUser {
                id,
                email: email.clone(),
                name: name.into(),
                role: role.into(),
                password_hash,
                salt,
                active: true,
            },
        );
        Ok(())
    }

    /// Returns `true` if a user with the email exists.
    pub fn has_user(&self, email: &str) -> bool {
        self.inner.users.read().contains_key(email)
    }

    /// Deactivates a user account; the user can no longer authenticate.
    pub fn deactivate_user(&self, email: &str) -> Result<(), AuthError> {
        match self.inner.users.write().get_mut(email) {
            Some(user) => {
                user.active = false;
                Ok(())
            }
            None => Err(AuthError::UserNotFound),
        }
    }

    fn user_by_id(&self, id: &str) -> Option<SessionUser> {
        self.inner
            .users
            .read()
            .values()
            .find(|u| u.id == id && u.active)
            .map(SessionUser::from)
    }

    fn sign(&self, payload: &str) -> String {
        let digest = Sha256::digest(format!("{}:{payload}", self.inner.secret).as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    fn cookie_value_for(&self, user_id: &str) -> String {
        let expires = unix_now() + self.inner.max_age;
        let payload = format!("{user_id}:{expires}");
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), self.sign(&payload))
    }

    /// Verifies a cookie value and returns the user id it names.
    fn verify_cookie(&self, value: &str) -> Option<String> {
        let (encoded, signature) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let payload = String::from_utf8(payload).ok()?;
        if self.sign(&payload) != signature {
            return None;
        }
        let (user_id, expires) = payload.rsplit_once(':')?;
        let expires: u64 = expires.parse().ok()?;
        if expires <= unix_now() {
            return None;
        }
        Some(user_id.to_string())
    }

    fn session_user(&self, request: &Request<Body>) -> Option<SessionUser> {
        let value = cookie_from_request(request, SESSION_COOKIE)?;
        let user_id = self.verify_cookie(&value)?;
        self.user_by_id(&user_id)
    }
}

#[async_trait]
impl AuthProvider for SessionProvider {
    fn name(&self) -> &str {
        "session"
    }

    async fn authenticate(&self, credentials: &ConfigMap) -> Result<Arc<dyn AuthUser>, AuthError> {
        let email = credentials
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let password = credentials
            .get("password")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let users = self.inner.users.read();
        let user = users.get(email).ok_or(AuthError::InvalidCredentials)?;
        if !user.active {
            return Err(AuthError::UserInactive);
        }
        if hash_password(&user.salt, password) != user.password_hash {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Arc::new(SessionUser::from(user)))
    }

    fn user_for(&self, request: &Request<Body>) -> Option<Arc<dyn AuthUser>> {
        self.session_user(request)
            .map(|u| Arc::new(u) as Arc<dyn AuthUser>)
    }

    fn login(&self, user: &dyn AuthUser) -> Result<Option<HeaderValue>, AuthError> {
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_value_for(&user.id()),
            self.inner.max_age
        );
        HeaderValue::from_str(&cookie)
            .map(Some)
            .map_err(|e| AuthError::Session(e.to_string()))
    }

    fn logout(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        ))
        .ok()
    }

    fn is_authenticated(&self, request: &Request<Body>) -> bool {
        self.session_user(request).is_some()
    }

    fn require_auth(&self) -> RouteMiddleware {
        let provider = self.clone();
        Arc::new(move |next: RouteService| {
            let provider = provider.clone();
            handler(move |mut request: Request<Body>| {
                let provider = provider.clone();
                let next = next.clone();
                async move {
                    match provider.session_user(&request) {
                        Some(user) => {
                            request
                                .extensions_mut()
                                .insert(CurrentUser(Arc::new(user)));
                            call(next, request).await
                        }
                        None => login_redirect(&request),
                    }
                }
            })
        })
    }

    fn require_role(&self, roles: &[&str]) -> RouteMiddleware {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let provider = self.clone();
        Arc::new(move |next: RouteService| {
            let provider = provider.clone();
            let roles = roles.clone();
            handler(move |mut request: Request<Body>| {
                let provider = provider.clone();
                let roles = roles.clone();
                let next = next.clone();
                async move {
                    let Some(user) = provider.session_user(&request) else {
                        return login_redirect(&request);
                    };
                    if !roles.iter().any(|r| *r == user.role) {
                        return StatusCode::FORBIDDEN.into_response();
                    }
                    request
                        .extensions_mut()
                        .insert(CurrentUser(Arc::new(user)));
                    call(next, request).await
                }
            })
        })
    }
}

fn login_redirect(request: &Request<Body>) -> axum::response::Response {
    let mut target = request.uri().path().to_string();
    if let Some(query) = request.uri().query() {
        target = format!("{target}?{query}");
    }
    Redirect::to(&format!("/login?return={target}")).into_response()
}

/// Reads a cookie value from the request's `Cookie` header.
pub(crate) fn cookie_from_request(request: &Request<Body>, name: &str) -> Option<String> {
    let header = request.headers().get(COOKIE)?.to_str().ok()?;
    for cookie in header.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(&format!("{name}=")) {
            return Some(value.to_string());
        }
    }
    None
}

fn hash_password(salt: &str, password: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(format!("{salt}:{password}").as_bytes()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
