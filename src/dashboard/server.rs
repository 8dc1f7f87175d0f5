use std::future::Future;

use axum::{
    routing::get,
    Router,
    response::{IntoResponse, Response},
    http::{header, Uri, StatusCode},
    body::Body,
};
use tower_http::compression::CompressionLayer;
use rust_embed::RustEmbed;
use crate::dashboard::dashboard_messages::get_messages;
use crate::dashboard::dashboard_status::get_status;
use crate::ViewerEngine;

#[derive(RustEmbed)]
#[folder = "dashboard/"]
struct Assets;

const INDEX: &str = "index.html";

pub fn router(engine: ViewerEngine) -> Router {
    Router::new()
        .route("/messages", get(get_messages))
        .route("/status", get(get_status))
        .layer(CompressionLayer::new())
        .fallback(static_handler)
        .with_state(engine)
}

pub async fn start_dashboard_server<F>(engine: ViewerEngine, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 Dashboard available at http://{}", addr);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves when `signal` fires. A signal that cannot be installed never
/// fires: the server keeps running instead of shutting down at startup.
pub async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for shutdown signal; stop the process externally");
            std::future::pending::<()>().await;
        }
    }
}

fn serve_asset(path: &str) -> Option<Response> {
    let asset = Assets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some(([(header::CONTENT_TYPE, mime.as_ref())], Body::from(asset.data)).into_response())
}

// unknown paths get the page itself
async fn static_handler(uri: Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => INDEX,
        path => path,
    };

    serve_asset(path)
        .or_else(|| serve_asset(INDEX))
        .unwrap_or_else(|| (StatusCode::NOT_FOUND, "Dashboard page is not embedded").into_response())
}
