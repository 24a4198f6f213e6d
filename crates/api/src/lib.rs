//! `api` crate: HTTP + WebSocket surface of the engine.
//!
//! Exposes:
//!   POST /workflows/run                      run a workflow now
//!   POST /workflows/schedule                 run a workflow after a delay
//!   GET  /workflows/log/{run_id}?from=N      read a run's log
//!   GET  /workflows/ws/workflow_log/{run_id} stream a run's log (WebSocket)

use std::future::Future;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod handlers;

pub use handlers::AppState;

/// Build the router with all routes mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows/run", post(handlers::runs::submit))
        .route("/workflows/schedule", post(handlers::runs::schedule))
        .route("/workflows/log/:run_id", get(handlers::logs::tail))
        .route("/workflows/ws/workflow_log/:run_id", get(handlers::logs::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
