//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::error::{SignageError, SignageResult};
use crate::events::{EventEmitter, NoopEventEmitter};
use crate::services::context::collectors::{
    CalendarCollector, Collector, OccupancyCollector, SecurityCollector, SignalsCache,
    StreamedCollector, TimeCollector, WeatherCollector,
};
use crate::services::context::run_collector;
use crate::services::{
    ContextEngine, PushBus, ScheduleEvaluator, ScreenRegistry, SyncEngine, VideoLibrary,
};
use crate::state::Config;
use crate::store::Store;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
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
    /// Shared HTTP client for collector polls.
    http_client: Client,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

/// Creates the shared HTTP client for all collector communication.
///
/// Every outbound poll inherits the hard timeout; a shared client enables
/// connection pooling across collectors.
fn create_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all application services with their dependencies.
///
/// The wiring order matters - services are created in dependency order:
///
/// 1. Store (embedded catalogue; every screen starts offline)
/// 2. Registry (connected map, queues, modes, screenshots)
/// 3. Push bus (store + registry)
/// 4. Sync engine, schedule evaluator, context engine
///
/// Pass `db_path = None` for an in-memory catalogue.
pub fn bootstrap_services(
    config: Config,
    db_path: Option<&Path>,
) -> SignageResult<BootstrappedServices> {
    config
        .validate()
        .map_err(SignageError::InvalidInput)?;
    let config = Arc::new(config);

    let store = Arc::new(match db_path {
        Some(path) => Store::open(path)?,
        None => Store::open_in_memory()?,
    });
    // No channel survives a restart; reset reachability before serving.
    store.set_all_screens_offline()?;

    let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
    let http_client = create_http_client(config.collector_timeout_secs);
    let cancel_token = CancellationToken::new();

    let registry = Arc::new(ScreenRegistry::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        config.outbound_queue_bound,
        config.offline_threshold_minutes,
    ));
    let bus = Arc::new(PushBus::new(Arc::clone(&store), Arc::clone(&registry)));
    let sync = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&emitter),
        cancel_token.clone(),
    ));
    let schedules = Arc::new(ScheduleEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&emitter),
        cancel_token.clone(),
        config.schedule_interval_secs,
        config.schedule_poke_delay_ms,
    ));

    let cache = Arc::new(SignalsCache::new());
    let context = Arc::new(ContextEngine::new(
        Arc::clone(&registry),
        Arc::clone(&cache),
        config.mood_lerp_interval_ms,
        config.mood_broadcast_interval_ms,
        cancel_token.clone(),
    ));
    let videos = Arc::new(VideoLibrary::new(config.video_dir.clone()));

    Ok(BootstrappedServices {
        store,
        registry,
        bus,
        sync,
        schedules,
        context,
        videos,
        config,
        http_client,
        cancel_token,
    })
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Spawns every background loop: registry sweep, schedule evaluator,
    /// mood interpolation + broadcast, and the configured collectors.
    pub fn start_background_tasks(&self) {
        // Registry sweep flips heartbeat-silent screens offline.
        {
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel_token.clone();
            let sweep_interval = Duration::from_secs(self.config.registry_sweep_interval_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = interval.tick() => {}
                    }
                    if let Err(e) = registry.sweep_offline() {
                        log::warn!("[Registry] Offline sweep failed: {e}");
                    }
                }
            });
        }

        tokio::spawn(Arc::clone(&self.schedules).run());
        tokio::spawn(Arc::clone(&self.context).run_interpolation());
        tokio::spawn(Arc::clone(&self.context).run_broadcast());

        // Poll collectors. Time and calendar always run; the rest only
        // with a configured endpoint.
        let mut collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(TimeCollector::new(
                Arc::clone(&self.store),
                Arc::clone(self.context.cache()),
            )),
            Arc::new(CalendarCollector),
        ];
        let endpoints = &self.config.collectors;
        if let Some(ref url) = endpoints.weather_url {
            collectors.push(Arc::new(WeatherCollector::new(
                Arc::clone(&self.store),
                Arc::clone(self.context.cache()),
                self.http_client.clone(),
                url.clone(),
            )));
        }
        if let Some(ref url) = endpoints.occupancy_url {
            collectors.push(Arc::new(OccupancyCollector::new(
                Arc::clone(&self.store),
                Arc::clone(self.context.cache()),
                self.http_client.clone(),
                url.clone(),
            )));
        }
        if let Some(ref url) = endpoints.security_url {
            collectors.push(Arc::new(SecurityCollector::new(
                Arc::clone(&self.store),
                Arc::clone(self.context.cache()),
                self.http_client.clone(),
                url.clone(),
            )));
        }
        for collector in collectors {
            tokio::spawn(run_collector(collector, self.cancel_token.clone()));
        }

        // Streamed collectors reconnect with a fixed backoff.
        let backoff = Duration::from_secs(self.config.collector_reconnect_secs);
        if let Some(ref url) = endpoints.audio_url {
            let streamed = StreamedCollector::new(
                Arc::clone(self.context.cache()),
                self.http_client.clone(),
                url.clone(),
                "audio",
                backoff,
            );
            tokio::spawn(streamed.run(self.cancel_token.clone()));
        }
        if let Some(ref url) = endpoints.people_count_url {
            let streamed = StreamedCollector::new(
                Arc::clone(self.context.cache()),
                self.http_client.clone(),
                url.clone(),
                "people-count",
                backoff,
            );
            tokio::spawn(streamed.run(self.cancel_token.clone()));
        }

        log::info!("[Bootstrap] Background tasks started");
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to every loop and pending sync timer.
        self.cancel_token.cancel();

        let runs_stopped = self.sync.stop_all();
        log::info!("[Bootstrap] Cancelled {runs_stopped} sync run(s)");

        let channels_closed = self.registry.close_all();
        log::info!("[Bootstrap] Closed {channels_closed} screen channel(s)");

        log::info!("[Bootstrap] Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_wires_in_memory_stack() {
        let services = bootstrap_services(Config::default(), None).unwrap();
        assert_eq!(services.registry.connected_count(), 0);
        assert!(services
            .store
            .get_client(crate::model::BOOTSTRAP_TENANT)
            .is_ok());
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let config = Config {
            outbound_queue_bound: 0,
            ..Default::default()
        };
        assert!(bootstrap_services(config, None).is_err());
    }

    #[tokio::test]
    async fn shutdown_cancels_runs_and_channels() {
        let services = bootstrap_services(Config::default(), None).unwrap();
        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
    }
}
