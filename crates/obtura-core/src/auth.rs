//! Authentication provider contract.
//!
//! The runtime knows no auth policy. Providers implement [`AuthProvider`] and
//! register with the auth plugin, which keeps one of them *active* and builds
//! request-scoping middleware from it. [`NoAuthProvider`] is the disabled
//! state: every request passes as a guest.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::Request;

use crate::error::AuthError;
use crate::plugin::ConfigMap;
use crate::route::RouteMiddleware;

/// An authenticated identity.
pub trait AuthUser: Send + Sync + std::fmt::Debug {
    /// Stable user id.
    fn id(&self) -> String;
    /// Email address.
    fn email(&self) -> String;
    /// Display name.
    fn name(&self) -> String;
    /// Role name used by [`AuthProvider::require_role`].
    fn role(&self) -> String;
    /// Granted permissions; `"*"` means all.
    fn permissions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The unauthenticated identity used when auth is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestUser;

impl AuthUser for GuestUser {
    fn id(&self) -> String {
        "guest".to_string()
    }
    fn email(&self) -> String {
        "guest@example.com".to_string()
    }
    fn name(&self) -> String {
        "Guest".to_string()
    }
    fn role(&self) -> String {
        "guest".to_string()
    }
}

/// Request extension carrying the authenticated user.
///
/// Inserted by `require_auth` middleware before the inner handler runs.
#[derive(Clone)]
pub struct CurrentUser(pub Arc<dyn AuthUser>);

/// Reads the authenticated user injected by auth middleware, if any.
pub fn current_user(request: &Request<Body>) -> Option<Arc<dyn AuthUser>> {
    request
        .extensions()
        .get::<CurrentUser>()
        .map(|u| Arc::clone(&u.0))
}

/// An interchangeable authentication/authorization policy.
///
/// Several providers may be registered with the auth plugin; one is active at
/// a time. All request-path methods are synchronous; session recognition
/// must not perform IO.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Provider name, e.g. `"session"`, `"none"`.
    fn name(&self) -> &str;

    /// Attempts to authenticate the given credential document.
    async fn authenticate(&self, credentials: &ConfigMap) -> Result<Arc<dyn AuthUser>, AuthError>;

    /// Resolves the user carried by the request's session material.
    fn user_for(&self, request: &Request<Body>) -> Option<Arc<dyn AuthUser>>;

    /// Produces the `Set-Cookie` value establishing a session for `user`, or
    /// `None` when the provider keeps no session state.
    fn login(&self, user: &dyn AuthUser) -> Result<Option<HeaderValue>, AuthError>;

    /// Produces the `Set-Cookie` value tearing the session down, if any.
    fn logout(&self) -> Option<HeaderValue>;

    /// Returns `true` when the request carries a valid session.
    fn is_authenticated(&self, request: &Request<Body>) -> bool;

    /// Middleware requiring an authenticated user.
    fn require_auth(&self) -> RouteMiddleware;

    /// Middleware requiring an authenticated user with one of the roles.
    fn require_role(&self, roles: &[&str]) -> RouteMiddleware;
}

/// Provider that allows all access; used when auth is effectively disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn authenticate(&self, _credentials: &ConfigMap) -> Result<Arc<dyn AuthUser>, AuthError> {
        Ok(Arc::new(GuestUser))
    }

    fn user_for(&self, _request: &Request<Body>) -> Option<Arc<dyn AuthUser>> {
        Some(Arc::new(GuestUser))
    }

    fn login(&self, _user: &dyn AuthUser) -> Result<Option<HeaderValue>, AuthError> {
        Ok(None)
    }

    fn logout(&self) -> Option<HeaderValue> {
        None
    }

    fn is_authenticated(&self, _request: &Request<Body>) -> bool {
        true
    }

    fn require_auth(&self) -> RouteMiddleware {
        Arc::new(|next| next)
    }

    fn require_role(&self, _roles: &[&str]) -> RouteMiddleware {
        Arc::new(|next| next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_auth_always_passes() {
        let provider = NoAuthProvider;
        let req = Request::builder().uri("/admin").body(Body::empty()).unwrap();

        assert!(provider.is_authenticated(&req));
        assert_eq!(provider.user_for(&req).unwrap().role(), "guest");

        let user = provider.authenticate(&ConfigMap::new()).await.unwrap();
        assert_eq!(user.id(), "guest");
        assert!(provider.login(&*user).unwrap().is_none());
        assert!(provider.logout().is_none());
    }
}
