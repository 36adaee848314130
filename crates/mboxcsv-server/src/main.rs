//! mboxcsv server entry point

use anyhow::Result;
use mboxcsv_common::logging::{init_logging, LogConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use mboxcsv_server::{config::Config, features, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment overrides the built-in defaults
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_filter("mboxcsv_server=debug,tower_http=debug,axum=trace".to_string());

    init_logging(&log_config)?;

    info!("Starting mboxcsv server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let shutdown_timeout_secs = config.server.shutdown_timeout_secs;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Creates the data and download directories and sizes the worker pool
    let state = AppState::init(config).await?;
    info!(
        workers = state.config.convert.workers,
        max_upload_bytes = state.config.upload.max_bytes,
        "Application state initialized"
    );

    let app = features::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight requests and conversions a moment to settle
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
