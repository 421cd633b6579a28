//! Marquee Server - standalone headless digital signage control plane.
//!
//! This binary hosts the screen registry, push bus, sync engine, schedule
//! evaluator and context engine behind one HTTP/WS port. It's designed
//! for server deployments where the control plane runs as a background
//! daemon on the venue LAN.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use marquee_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Marquee Server - multi-tenant digital signage control plane.
#[derive(Parser, Debug)]
#[command(name = "marquee-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "MARQUEE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "MARQUEE_PORT")]
    port: Option<u16>,

    /// SQLite catalogue path (overrides config file; in-memory if absent).
    #[arg(short = 'd', long, env = "MARQUEE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Video library directory (overrides config file).
    #[arg(long, env = "MARQUEE_VIDEO_DIR")]
    video_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Marquee Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = Some(db_path);
    }
    if let Some(video_dir) = args.video_dir {
        config.video_dir = Some(video_dir);
    }

    match config.db_path {
        Some(ref path) => log::info!("Using catalogue at {}", path.display()),
        None => log::warn!("No db_path configured - catalogue is in-memory and will not persist"),
    }

    // Bootstrap services
    let core_config = config.to_core_config();
    let services = bootstrap_services(core_config, config.db_path.as_deref())
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    services.start_background_tasks();

    // Spawn the HTTP/WS server on the main runtime.
    let app_state = AppState::new(&services);
    let server_shutdown = services.cancel_token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, server_shutdown).await {
            log::error!("Server error: {e}");
        }
    });

    log::info!("HTTP server started on port {}", config.port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: cancels loops, sync timers and screen channels;
    // the server task drains on the same token.
    services.shutdown().await;
    let _ = server_handle.await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
