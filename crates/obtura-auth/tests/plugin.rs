//! Auth plugin wired through a real registry: login routes, session
//! round-trip, and the admin guard.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use obtura_auth::{AuthPlugin, AUTH_PLUGIN_ID, SESSION_COOKIE};
use obtura_runtime::{JsonFileConfigStorage, Registry};

async fn bootstrapped() -> (Arc<Registry>, Arc<AuthPlugin>, Router) {
    let registry = Registry::new();
    let auth = Arc::new(AuthPlugin::new());
    registry.register(auth.clone()).unwrap();

    registry.initialize().await.unwrap();
    registry.start(CancellationToken::new()).await.unwrap();

    // The guard must be in place before the router drains the queue.
    registry.set_admin_guard(auth.require_admin());
    registry.set_router(Router::new());
    let router = registry.take_router().unwrap();

    (registry, auth, router)
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "email={email}&password={password}&return=/admin/auth"
        )))
        .unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with(SESSION_COOKIE));
    set_cookie
        .split_once('=')
        .unwrap()
        .1
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn login_page_is_served() {
    let (_registry, _auth, router) = bootstrapped().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn seeded_admin_can_log_in_and_reach_admin_pages() {
    let (_registry, _auth, router) = bootstrapped().await;

    // Valid credentials: 303 with a session cookie.
    let response = router
        .clone()
        .oneshot(login_request("admin@example.com", "admin123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response);

    // The session is recognized on the guarded admin page.
    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/auth")
                .header(COOKIE, format!("{SESSION_COOKIE}={cookie}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let (_registry, _auth, router) = bootstrapped().await;

    let response = router
        .oneshot(login_request("admin@example.com", "wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn admin_pages_redirect_anonymous_requests_to_login() {
    let (_registry, _auth, router) = bootstrapped().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/auth")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("/login"));
}

#[tokio::test]
async fn logout_expires_the_session_cookie() {
    let (_registry, _auth, router) = bootstrapped().await;

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn provider_switch_changes_and_persists_the_active_provider() {
    let (registry, auth, router) = bootstrapped().await;
    assert_eq!(auth.active_provider().name(), "session");

    // Switching needs an admin session.
    let response = router
        .clone()
        .oneshot(login_request("admin@example.com", "admin123"))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/auth/provider")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(COOKIE, format!("{SESSION_COOKIE}={cookie}"))
                .body(Body::from("provider=none"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(auth.active_provider().name(), "none");

    // The switch was written through to the config store, not just flipped
    // in memory.
    let config = registry.get_config(AUTH_PLUGIN_ID).await.unwrap();
    assert_eq!(config["active_provider"], json!("none"));
}

#[tokio::test]
async fn provider_switch_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let bootstrap = |path: std::path::PathBuf| async move {
        let storage = JsonFileConfigStorage::new(path).unwrap();
        let registry = Registry::builder().storage(Box::new(storage)).build();
        let auth = Arc::new(AuthPlugin::new());
        registry.register(auth.clone()).unwrap();
        registry.initialize().await.unwrap();
        registry.start(CancellationToken::new()).await.unwrap();
        (registry, auth)
    };

    {
        let (_registry, auth) = bootstrap(dir.path().to_path_buf()).await;
        auth.set_active_provider("none").await.unwrap();
    }

    // A fresh registry and plugin over the same config directory pick the
    // persisted provider, not the default.
    let (_registry, auth) = bootstrap(dir.path().to_path_buf()).await;
    assert_eq!(auth.active_provider().name(), "none");
}
