//! Probe server setup.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::readiness::Readiness;

/// Build the probe router.
pub fn create_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .with_state(readiness)
}

/// GET /ready - 200 once ready, 500 before.
async fn ready(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    let ready = readiness.is_ready();
    debug!(ready, "Readiness probe");
    if ready {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }
}

/// Bind `addr` and serve the probe until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound, or
/// [`ServerError::Serve`] if the server fails while running.
pub async fn serve(addr: SocketAddr, readiness: Readiness, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "Readiness probe listening");

    axum::serve(listener, create_router(readiness))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
