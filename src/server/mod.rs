/// HTTP ingress for logseal.
///
/// The server is a thin boundary: it reads the body, hands it to the
/// pipeline, and maps the outcome to a status code. It never logs request
/// bodies and never decrypts anything.
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::error::{LogsealError, Result};
use crate::pipeline::Pipeline;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::upload_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C. Each request runs on its own task.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(LogsealError::Io)?;

    tracing::info!("logseal listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(LogsealError::Io)?;

    tracing::info!("logseal stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, draining in-flight requests");
}
