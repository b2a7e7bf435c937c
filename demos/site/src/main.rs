//! Demo host: one HTTP process serving the auth, hello, and analytics
//! plugins behind a shared router.
//!
//! Run with `cargo run -p obtura-site`; configuration is read from
//! `obtura.yaml` in the working directory when present. Sign in at `/login`
//! with the seeded `admin@example.com` / `admin123` account.

use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tracing::error;

use obtura::prelude::*;
use obtura::HostResult;
use obtura_plugin_analytics::AnalyticsPlugin;
use obtura_plugin_hello::HelloPlugin;

#[tokio::main]
async fn main() -> HostResult<()> {
    let app = ObturaApp::new();

    let auth = Arc::new(AuthPlugin::new());
    app.register(auth.clone())?;
    app.register(Arc::new(HelloPlugin::new()))?;
    app.register(Arc::new(AnalyticsPlugin::new()))?;

    // Admin routes bind behind the auth plugin's role check.
    app.registry().set_admin_guard(auth.require_admin());

    let router = Router::new().route("/", get(home));

    if let Err(err) = app.run(router).await {
        error!(error = %err, "host exited with error");
        return Err(err);
    }
    Ok(())
}

async fn home() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>Obtura</title></head>
<body>
    <h1>Obtura</h1>
    <ul>
        <li><a href="/hello">Hello plugin</a></li>
        <li><a href="/admin/analytics">Analytics (admin)</a></li>
        <li><a href="/login">Sign in</a></li>
    </ul>
</body>
</html>"#,
    )
}
