use std::sync::Arc;

use anyhow::{Context, Result};
use faceverify_core::{FaceComparer, OnnxComparer};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod classify;
mod config;
mod error;
mod routes;
mod staging;
mod state;
mod store;
mod translate;
mod upload;
mod worker_pool;

#[cfg(test)]
mod test_support;

use config::Config;
use state::AppState;
use store::StatusStore;
use worker_pool::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "faceverifyd starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        db_path = %config.db_path.display(),
        workers = config.workers,
        "configuration loaded"
    );

    let store = StatusStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open status store at {}", config.db_path.display()))?;

    let comparer = OnnxComparer::new(&config.model_dir);
    for path in [comparer.scrfd_model_path(), comparer.arcface_model_path()] {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "model file missing; verifications will fail until it is installed"
            );
        }
    }
    let comparer: Arc<dyn FaceComparer> = Arc::new(comparer);

    let pool = WorkerPool::new(config.workers, config.max_pending)
        .context("failed to start worker pool")?;
    let pool = Arc::new(pool);

    let state = AppState {
        comparer,
        pool: Arc::clone(&pool),
        store: store.clone(),
        compare_options: Arc::new(config.compare_options()),
        staging_root: config.staging_dir.clone(),
    };
    let app = routes::router(state, routes::cors_layer(&config.cors_origins));

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "faceverifyd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("faceverifyd shutting down");
    tokio::task::spawn_blocking(move || pool.shutdown())
        .await
        .context("worker pool shutdown failed")?;
    store.close().await.context("failed to close status store")?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
