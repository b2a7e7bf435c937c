//! Route declarations contributed by plugins.
//!
//! A plugin declares routes as data: method, path template, a boxed handler
//! service, and an ordered list of per-route middleware wrappers. The runtime
//! never interprets path templates; they pass through to the host router
//! unchanged. Routes are queued at registration time and bound only once the
//! host attaches its router (see the registry's deferred route queue).

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use serde::Serialize;
use tower::service_fn;
use tower::util::BoxCloneSyncService;

/// Boxed request handler service used for every plugin-contributed route.
///
/// Cloneable so the binder can compose middleware around it and the router
/// can service concurrent requests.
pub type RouteService = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// A request wrapper: takes the inner service, returns the wrapped service.
///
/// Used both for per-route middleware (composed in reverse declaration order
/// at bind time) and for plugin-contributed global middleware.
pub type RouteMiddleware = Arc<dyn Fn(RouteService) -> RouteService + Send + Sync>;

/// Wraps an async request function into a [`RouteService`].
///
/// # Example
///
/// ```rust,ignore
/// let svc = handler(|_req| async { Html("hello").into_response() });
/// ```
pub fn handler<F, Fut>(f: F) -> RouteService
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    BoxCloneSyncService::new(service_fn(move |req: Request<Body>| {
        let f = f.clone();
        async move { Ok::<_, Infallible>(f(req).await) }
    }))
}

/// Invokes a boxed route service, unwrapping the infallible error.
///
/// Middleware implementations use this to call the wrapped inner service.
pub async fn call(service: RouteService, request: Request<Body>) -> Response {
    use tower::ServiceExt;
    match service.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// One HTTP route contributed by a plugin.
#[derive(Clone)]
pub struct Route {
    /// HTTP method the route answers to.
    pub method: Method,
    /// Path template in the host router's syntax; passed through verbatim.
    pub path: String,
    /// The request handler.
    pub handler: RouteService,
    /// Per-route middleware, outermost first.
    pub middlewares: Vec<RouteMiddleware>,
}

impl Route {
    /// Creates a route from a method, path, and handler service.
    pub fn new(method: Method, path: impl Into<String>, handler: RouteService) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
            middlewares: Vec::new(),
        }
    }

    /// Creates a `GET` route from an async request function.
    pub fn get<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(Method::GET, path, handler(f))
    }

    /// Creates a `POST` route from an async request function.
    pub fn post<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(Method::POST, path, handler(f))
    }

    /// Creates a `PUT` route from an async request function.
    pub fn put<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(Method::PUT, path, handler(f))
    }

    /// Creates a `DELETE` route from an async request function.
    pub fn delete<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(Method::DELETE, path, handler(f))
    }

    /// Creates a `PATCH` route from an async request function.
    pub fn patch<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(Method::PATCH, path, handler(f))
    }

    /// Appends a per-route middleware. Declaration order is outermost first.
    pub fn layer(mut self, middleware: RouteMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

/// An admin navigation menu entry contributed by a plugin.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NavItem {
    /// Display title.
    pub title: String,
    /// Link target.
    pub path: String,
    /// Icon identifier; interpreted by the admin UI, not the runtime.
    pub icon: String,
    /// Sort order within the menu.
    pub order: i32,
    /// Nested entries.
    pub children: Vec<NavItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_handler_produces_response() {
        let svc = handler(|_req| async { "hello".into_response() });
        let res = svc
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[test]
    fn test_route_constructors_set_method() {
        let route = Route::get("/hello", |_req| async { "ok".into_response() });
        assert_eq!(route.method, Method::GET);
        assert_eq!(route.path, "/hello");
        assert!(route.middlewares.is_empty());

        let route = Route::post("/login", |_req| async { "ok".into_response() });
        assert_eq!(route.method, Method::POST);
    }

    #[test]
    fn test_layer_appends_in_order() {
        let mw: RouteMiddleware = Arc::new(|svc| svc);
        let route = Route::get("/x", |_req| async { "ok".into_response() })
            .layer(mw.clone())
            .layer(mw);
        assert_eq!(route.middlewares.len(), 2);
    }
}
