//! Core application configuration.
//!
//! Provides [`Config`] with validated defaults for every tunable the
//! runtime exposes: server port, heartbeat thresholds, loop cadences,
//! queue bounds, and optional collector endpoints.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Endpoints for the external signal sources the context engine polls.
///
/// Every field is optional: a missing endpoint simply disables that
/// collector. The time collector needs no endpoint and always runs.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CollectorEndpoints {
    /// Weather poll endpoint (receives `lat`/`lon` query parameters).
    pub weather_url: Option<String>,
    /// Occupancy poll endpoint (receives a `location` query parameter).
    pub occupancy_url: Option<String>,
    /// Security-level poll endpoint (receives a `location` query parameter).
    pub security_url: Option<String>,
    /// Streamed audio-level source (reconnecting reader).
    pub audio_url: Option<String>,
    /// Streamed people-count source (reconnecting reader).
    pub people_count_url: Option<String>,
}

/// Configuration for the Marquee control plane.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server.
    pub port: u16,

    /// Directory scanned for the static video catalogue.
    pub video_dir: Option<PathBuf>,

    // Screens
    /// Expected interval between screen heartbeats (seconds).
    pub heartbeat_interval_secs: u64,

    /// Minutes without a heartbeat before a screen is flipped offline.
    /// Overridden at runtime by the `offline_threshold_minutes` setting.
    pub offline_threshold_minutes: u64,

    /// Interval between offline sweeps of the screen registry (seconds).
    pub registry_sweep_interval_secs: u64,

    /// Bound of the per-screen outbound message queue. On overflow the
    /// oldest queued message is dropped and a counter incremented.
    pub outbound_queue_bound: usize,

    // Schedules
    /// Interval between full schedule evaluations (seconds).
    pub schedule_interval_secs: u64,

    /// Delay between a schedule mutation and the triggered re-evaluation
    /// (milliseconds). Must stay well under five seconds.
    pub schedule_poke_delay_ms: u64,

    // Context engine
    /// Mood interpolation tick (milliseconds).
    pub mood_lerp_interval_ms: u64,

    /// Mood broadcast and target-refresh tick (milliseconds).
    pub mood_broadcast_interval_ms: u64,

    /// Collector endpoints.
    #[serde(default)]
    pub collectors: CollectorEndpoints,

    /// Hard timeout for any outbound collector poll (seconds).
    pub collector_timeout_secs: u64,

    /// Backoff before a streamed collector reconnects (seconds).
    pub collector_reconnect_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3400,
            video_dir: None,
            heartbeat_interval_secs: 30,
            offline_threshold_minutes: 10,
            registry_sweep_interval_secs: 60,
            outbound_queue_bound: 64,
            schedule_interval_secs: 60,
            schedule_poke_delay_ms: 500,
            mood_lerp_interval_ms: 500,
            mood_broadcast_interval_ms: 2000,
            collectors: CollectorEndpoints::default(),
            collector_timeout_secs: 10,
            collector_reconnect_secs: 30,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_queue_bound == 0 {
            return Err("outbound_queue_bound must be >= 1".to_string());
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("heartbeat_interval_secs must be >= 1".to_string());
        }
        if self.offline_threshold_minutes == 0 {
            return Err("offline_threshold_minutes must be >= 1".to_string());
        }
        if self.mood_lerp_interval_ms == 0 || self.mood_broadcast_interval_ms == 0 {
            return Err("mood intervals must be >= 1ms".to_string());
        }
        if self.schedule_poke_delay_ms >= 5000 {
            return Err("schedule_poke_delay_ms must stay under 5000".to_string());
        }
        Ok(())
    }

    /// Offline threshold in milliseconds.
    #[must_use]
    pub fn offline_threshold_ms(&self) -> u64 {
        self.offline_threshold_minutes * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 3400);
        assert_eq!(config.outbound_queue_bound, 64);
    }

    #[test]
    fn zero_queue_bound_rejected() {
        let config = Config {
            outbound_queue_bound: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn offline_threshold_in_ms() {
        let config = Config::default();
        assert_eq!(config.offline_threshold_ms(), 10 * 60 * 1000);
    }
}
