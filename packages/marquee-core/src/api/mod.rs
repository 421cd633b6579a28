//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services. It
//! provides the router construction and server startup functionality.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::services::{
    ContextEngine, PushBus, ScheduleEvaluator, ScreenRegistry, SyncEngine, VideoLibrary,
};
use crate::state::Config;
use crate::store::Store;

pub mod http;
pub mod response;
pub mod tenant;
pub mod ws;

pub use tenant::TenantScope;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services. All business
/// logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Catalogue persistence.
    pub store: Arc<Store>,
    /// Runtime screen fleet state and channels.
    pub registry: Arc<ScreenRegistry>,
    /// Targeted dispatch.
    pub bus: Arc<PushBus>,
    /// Coordinated group playback.
    pub sync: Arc<SyncEngine>,
    /// Playlist scheduling.
    pub schedules: Arc<ScheduleEvaluator>,
    /// Mood derivation and broadcast.
    pub context: Arc<ContextEngine>,
    /// Static video catalogue.
    pub videos: Arc<VideoLibrary>,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the state from a bootstrapped service container.
    pub fn new(services: &crate::BootstrappedServices) -> Self {
        Self {
            store: Arc::clone(&services.store),
            registry: Arc::clone(&services.registry),
            bus: Arc::clone(&services.bus),
            sync: Arc::clone(&services.sync),
            schedules: Arc::clone(&services.schedules),
            context: Arc::clone(&services.context),
            videos: Arc::clone(&services.videos),
            config: Arc::clone(&services.config),
        }
    }
}

/// Starts the HTTP server on the configured port and serves until the
/// shutdown token is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let port = state.config.port;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server listening on http://0.0.0.0:{port}");
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
