//! The deferred route queue and its bind-to-router step.
//!
//! Plugins contribute routes at registration time, before the host has
//! finished assembling its router. The binder therefore queues every
//! declaration and only binds once the host attaches a router; from then on,
//! later registrations bind immediately until the host takes the router back
//! for serving.
//!
//! Binding a route composes its per-route middleware around the handler in
//! reverse declaration order (so the first declared wrapper is outermost),
//! wraps admin-flagged routes with the installed admin guard, and dispatches
//! on the declared method to the router's method-specific bind operation.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::routing::{any_service, on_service, MethodFilter};
use axum::Router;
use tower::{Layer, Service};
use tracing::{debug, warn};

use obtura_core::route::{Route, RouteMiddleware, RouteService};

/// A queued route plus the admin flag recorded at enqueue time.
struct QueuedRoute {
    route: Route,
    admin: bool,
}

/// Holds plugin routes until the host router is attached, then binds them.
///
/// Owned by the registry and mutated under its table lock.
pub(crate) struct RouteBinder {
    router: Option<Router>,
    pending: Vec<QueuedRoute>,
    admin_guard: Option<RouteMiddleware>,
}

impl RouteBinder {
    pub(crate) fn new() -> Self {
        Self {
            router: None,
            pending: Vec::new(),
            admin_guard: None,
        }
    }

    /// Installs the wrapper applied to admin-flagged routes at bind time.
    pub(crate) fn set_admin_guard(&mut self, guard: RouteMiddleware) {
        self.admin_guard = Some(guard);
    }

    /// Queues a route, or binds it immediately when a router is attached.
    ///
    /// Admin routes arrive with their declared path; the `/admin` prefix is
    /// applied here.
    pub(crate) fn enqueue(&mut self, mut route: Route, admin: bool) {
        if admin {
            route.path = format!("/admin{}", route.path);
        }
        match self.router.take() {
            Some(router) => {
                self.router = Some(Self::bind(router, route, admin, &self.admin_guard));
            }
            None => self.pending.push(QueuedRoute { route, admin }),
        }
    }

    /// Attaches the host router and drains the queue onto it.
    ///
    /// Idempotent: a second attach while a router is held does nothing.
    pub(crate) fn attach(&mut self, router: Router) {
        if self.router.is_some() {
            warn!("router already attached, ignoring");
            return;
        }
        let mut router = router;
        for queued in self.pending.drain(..) {
            router = Self::bind(router, queued.route, queued.admin, &self.admin_guard);
        }
        self.router = Some(router);
    }

    /// Hands the composed router back for serving.
    ///
    /// Routes registered afterwards queue again until the next attach.
    pub(crate) fn take(&mut self) -> Option<Router> {
        self.router.take()
    }

    fn bind(
        router: Router,
        route: Route,
        admin: bool,
        admin_guard: &Option<RouteMiddleware>,
    ) -> Router {
        let mut service = route.handler;

        // Innermost wrapper last in the declaration list.
        for middleware in route.middlewares.iter().rev() {
            service = middleware(service);
        }
        if admin {
            if let Some(guard) = admin_guard {
                service = guard(service);
            }
        }

        debug!(method = %route.method, path = %route.path, "binding plugin route");

        match MethodFilter::try_from(route.method.clone()) {
            Ok(filter) => router.route(&route.path, on_service(filter, service)),
            // Methods without a filter (e.g. CONNECT) answer on any method.
            Err(_) => router.route(&route.path, any_service(service)),
        }
    }
}

/// Adapts a plugin-contributed [`RouteMiddleware`] to a `tower::Layer` so the
/// host can apply it to the whole router.
#[derive(Clone)]
pub struct PluginMiddlewareLayer(RouteMiddleware);

impl PluginMiddlewareLayer {
    /// Wraps a plugin middleware for use with `Router::layer`.
    pub fn new(middleware: RouteMiddleware) -> Self {
        Self(middleware)
    }
}

impl<S> Layer<S> for PluginMiddlewareLayer
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    type Service = RouteService;

    fn layer(&self, inner: S) -> Self::Service {
        (self.0)(RouteService::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn hello_route() -> Route {
        Route::get("/hello", |_req| async { "hello".into_response() })
    }

    async fn status_of(router: Router, path: &str) -> StatusCode {
        router
            .oneshot(
                Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_routes_queue_until_attach() {
        let mut binder = RouteBinder::new();
        binder.enqueue(hello_route(), false);

        binder.attach(Router::new());
        let router = binder.take().unwrap();
        assert_eq!(status_of(router, "/hello").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_enqueue_after_attach_binds_immediately() {
        let mut binder = RouteBinder::new();
        binder.attach(Router::new());
        binder.enqueue(hello_route(), false);

        let router = binder.take().unwrap();
        assert_eq!(status_of(router, "/hello").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_are_prefixed() {
        let mut binder = RouteBinder::new();
        binder.enqueue(
            Route::get("/stats", |_req| async { "stats".into_response() }),
            true,
        );
        binder.attach(Router::new());

        let router = binder.take().unwrap();
        assert_eq!(status_of(router.clone(), "/admin/stats").await, StatusCode::OK);
        assert_eq!(status_of(router, "/stats").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_guard_wraps_admin_routes_only() {
        let mut binder = RouteBinder::new();
        binder.set_admin_guard(Arc::new(|_next| {
            obtura_core::route::handler(|_req| async {
                StatusCode::FORBIDDEN.into_response()
            })
        }));
        binder.enqueue(hello_route(), false);
        binder.enqueue(
            Route::get("/stats", |_req| async { "stats".into_response() }),
            true,
        );
        binder.attach(Router::new());

        let router = binder.take().unwrap();
        assert_eq!(status_of(router.clone(), "/hello").await, StatusCode::OK);
        assert_eq!(
            status_of(router, "/admin/stats").await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_per_route_middleware_composes_in_declaration_order() {
        // Each wrapper prepends a marker header value; the first declared
        // wrapper must run outermost.
        fn tagging(tag: &'static str) -> RouteMiddleware {
            Arc::new(move |next: RouteService| {
                obtura_core::route::handler(move |req: Request<Body>| {
                    let next = next.clone();
                    async move {
                        let mut res = next.oneshot(req).await.unwrap();
                        res.headers_mut().append(
                            "x-trace",
                            axum::http::HeaderValue::from_static(tag),
                        );
                        res
                    }
                })
            })
        }

        let mut binder = RouteBinder::new();
        binder.enqueue(
            Route::get("/t", |_req| async { "ok".into_response() })
                .layer(tagging("outer"))
                .layer(tagging("inner")),
            false,
        );
        binder.attach(Router::new());
        let router = binder.take().unwrap();

        let res = router
            .oneshot(Request::builder().uri("/t").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let tags: Vec<_> = res
            .headers()
            .get_all("x-trace")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        // Inner wrapper appends first on the way out, outer wrapper last.
        assert_eq!(tags, ["inner", "outer"]);
    }
}
