//! Status API
//!
//! Read-only HTTP surface for operators:
//! - `GET /health`: liveness
//! - `GET /status`: counters and cursor snapshot

pub mod health;
pub mod status;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::status::SharedStatus;

/// Create the router with all routes
pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/health", get(health::check))
        .route("/status", get(status::snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// Serve until `shutdown` flips to `true`
pub async fn serve(
    port: u16,
    status: SharedStatus,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on http://{}", addr);

    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
}
