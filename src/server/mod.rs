//! HTTP tool surface for the hybrid memory.
//!
//! Provides:
//! - `GET /health`
//! - `POST /tools/<name>` for every memory, graph and hybrid operation

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Router with CORS and request tracing applied.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the tool routes on `0.0.0.0:port` until `shutdown_signal` completes.
///
/// In-flight requests finish before the future resolves.
///
/// # Errors
/// Returns an I/O error if the listener cannot bind or accepting fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "hybrid memory tools listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await
}
