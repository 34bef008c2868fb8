// beaconlog - anonymous usage analytics collector
//
// Accepts events and registrations from SDK clients over HTTP, validates
// them with the same rules the SDK applies, and commits each one to the
// configured store.
//
// Architecture:
// - Server (axum): routing, version header, rate limiting, access log
// - Schema: shared validation rules and models
// - Storage: SQLite warehouse (rusqlite + r2d2) or JSON object store

mod cli;

use anyhow::{Context, Result};
use beaconlog::config::{Config, LogRotation, LoggingConfig};
use beaconlog::server::{self, AppState};
use beaconlog::storage::Storage;
use clap::Parser;
use cli::{Cli, Commands};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => run_collector(bind).await,
        Commands::Config {
            show,
            reset,
            path,
            yes,
        } => cli::handle_config(show, reset, path, yes),
        Commands::ClientId { product } => {
            cli::handle_client_id(&product);
            Ok(())
        }
    }
}

async fn run_collector(bind: Option<SocketAddr>) -> Result<()> {
    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let mut config = cli::load_or_exit();
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }

    // The guard must live until exit so buffered file logs are flushed
    let _file_guard = init_tracing(&config.logging);

    tracing::info!("beaconlog {} starting", beaconlog::config::VERSION);

    let storage = Storage::from_config(&config.storage).context("Failed to open storage")?;
    let state = AppState::new(storage, &config.server)?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    server::serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// Initialize tracing: stdout always, JSON files when enabled.
///
/// Precedence: RUST_LOG env var > config file > default "info"
fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = format!("beaconlog={},axum=info", logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let (file_layer, guard) = if logging.file_enabled {
        match std::fs::create_dir_all(&logging.file_dir) {
            Ok(()) => {
                let file_appender = match logging.file_rotation {
                    LogRotation::Hourly => {
                        tracing_appender::rolling::hourly(&logging.file_dir, &logging.file_prefix)
                    }
                    LogRotation::Daily => {
                        tracing_appender::rolling::daily(&logging.file_dir, &logging.file_prefix)
                    }
                    LogRotation::Never => {
                        tracing_appender::rolling::never(&logging.file_dir, &logging.file_prefix)
                    }
                };

                // Writes happen on a background thread
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {:?}: {}",
                    logging.file_dir, e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
