//! Startup helpers for the hybrid memory tool server.

use std::process::ExitCode;

use anyhow::Context;

use crate::memory::core::config::HybridConfig;
use crate::server::{self, AppState};

/// Install the global `tracing` subscriber (`RUST_LOG` overrides `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the server (used by the `hybrid-memory-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting hybrid memory v{}", env!("CARGO_PKG_VERSION"));

    let config = match HybridConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(&config)) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Connect the backends and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if a backend cannot be initialized or the server fails.
pub async fn serve(config: &HybridConfig) -> anyhow::Result<()> {
    tracing::info!(
        qdrant = %config.vector.url,
        collection = %config.vector.collection,
        neo4j = %config.graph.url,
        embedding_model = %config.embedding.model,
        reranker = config.reranker.enabled,
        "connecting memory backends"
    );
    let state = AppState::connect(config)
        .await
        .context("failed to initialize memory backends")?;

    server::run_server_with_shutdown(state, config.server.port, shutdown_signal())
        .await
        .context("tool server stopped with an error")?;

    tracing::info!("hybrid memory stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
