//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    /// Port to bind the HTTP/WS server to.
    /// Override: `MARQUEE_PORT`
    pub port: u16,

    /// Path of the SQLite catalogue. In-memory when unset.
    /// Override: `MARQUEE_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Directory scanned for the static video catalogue.
    /// Override: `MARQUEE_VIDEO_DIR`
    pub video_dir: Option<PathBuf>,

    /// Minutes without a heartbeat before a screen is flipped offline.
    pub offline_threshold_minutes: u64,

    /// Expected interval between screen heartbeats (seconds).
    pub heartbeat_interval_secs: u64,

    /// Weather poll endpoint.
    pub weather_url: Option<String>,

    /// Occupancy poll endpoint.
    pub occupancy_url: Option<String>,

    /// Security-level poll endpoint.
    pub security_url: Option<String>,

    /// Streamed audio-level source.
    pub audio_url: Option<String>,

    /// Streamed people-count source.
    pub people_count_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3400,
            db_path: None,
            video_dir: None,
            offline_threshold_minutes: 10,
            heartbeat_interval_secs: 30,
            weather_url: None,
            occupancy_url: None,
            security_url: None,
            audio_url: None,
            people_count_url: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MARQUEE_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = std::env::var("MARQUEE_DB_PATH") {
            self.db_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("MARQUEE_VIDEO_DIR") {
            self.video_dir = Some(PathBuf::from(val));
        }
    }

    /// Converts to marquee-core's Config type.
    pub fn to_core_config(&self) -> marquee_core::Config {
        marquee_core::Config {
            port: self.port,
            video_dir: self.video_dir.clone(),
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            offline_threshold_minutes: self.offline_threshold_minutes,
            collectors: marquee_core::CollectorEndpoints {
                weather_url: self.weather_url.clone(),
                occupancy_url: self.occupancy_url.clone(),
                security_url: self.security_url.clone(),
                audio_url: self.audio_url.clone(),
                people_count_url: self.people_count_url.clone(),
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3400);
        let core = config.to_core_config();
        assert_eq!(core.port, 3400);
        assert!(core.collectors.weather_url.is_none());
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = "port: 4000\nweather_url: http://weather.local/now\n";
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(
            config.weather_url.as_deref(),
            Some("http://weather.local/now")
        );
        // Unset fields keep their defaults.
        assert_eq!(config.offline_threshold_minutes, 10);
    }
}
