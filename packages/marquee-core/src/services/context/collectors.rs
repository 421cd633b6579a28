//! Signal collectors.
//!
//! Each collector ingests one external source and caches the latest
//! reading per location in the [`SignalsCache`]. Poll collectors run on
//! their own cadence with a hard request timeout; failures keep the stale
//! reading and only affect the log. Streamed collectors hold a long-lived
//! connection and reconnect with a fixed backoff.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{SignageError, SignageResult};
use crate::store::Store;

use super::signals::{AudioSignals, SignalBag, TimeSignals, WeatherSignals};

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Latest raw signal bag per location.
pub struct SignalsCache {
    bags: DashMap<String, SignalBag>,
}

impl SignalsCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            bags: DashMap::new(),
        }
    }

    /// Snapshot of one location's bag.
    pub fn get(&self, location_id: &str) -> Option<SignalBag> {
        self.bags.get(location_id).map(|r| r.value().clone())
    }

    /// Snapshot of every location's bag.
    pub fn all(&self) -> Vec<(String, SignalBag)> {
        self.bags
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Mutates (or creates) the bag for one location.
    pub fn update(&self, location_id: &str, f: impl FnOnce(&mut SignalBag)) {
        let mut entry = self
            .bags
            .entry(location_id.to_string())
            .or_insert_with(|| SignalBag::with_time(TimeSignals::at(Utc::now(), None)));
        f(entry.value_mut());
    }

    /// Drops locations no longer present in the catalogue.
    pub fn retain_locations(&self, valid: &[String]) {
        self.bags.retain(|id, _| valid.iter().any(|v| v == id));
    }
}

impl Default for SignalsCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poll collectors
// ─────────────────────────────────────────────────────────────────────────────

/// One pull-style signal source with its own cadence.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Interval between collection passes.
    fn cadence(&self) -> Duration;

    /// One collection pass. Errors are logged by the caller; the cache
    /// keeps whatever it had.
    async fn collect(&self) -> SignageResult<()>;
}

/// Always-available derived time signals, refreshed every minute in each
/// location's own timezone.
pub struct TimeCollector {
    store: Arc<Store>,
    cache: Arc<SignalsCache>,
}

impl TimeCollector {
    pub fn new(store: Arc<Store>, cache: Arc<SignalsCache>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl Collector for TimeCollector {
    fn name(&self) -> &'static str {
        "time"
    }

    fn cadence(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn collect(&self) -> SignageResult<()> {
        let locations = self.store.list_locations(None)?;
        let now = Utc::now();
        let valid: Vec<String> = locations.iter().map(|l| l.id.clone()).collect();
        for location in locations {
            let tz = location.timezone.as_deref().and_then(|z| Tz::from_str(z).ok());
            let time = TimeSignals::at(now, tz);
            self.cache.update(&location.id, |bag| bag.time = time);
        }
        self.cache.retain_locations(&valid);
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherResponse {
    condition: String,
    temp_c: f32,
}

/// Polls the weather endpoint per located site every ten minutes.
pub struct WeatherCollector {
    store: Arc<Store>,
    cache: Arc<SignalsCache>,
    http: reqwest::Client,
    url: String,
}

impl WeatherCollector {
    pub fn new(store: Arc<Store>, cache: Arc<SignalsCache>, http: reqwest::Client, url: String) -> Self {
        Self {
            store,
            cache,
            http,
            url,
        }
    }
}

#[async_trait]
impl Collector for WeatherCollector {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn cadence(&self) -> Duration {
        Duration::from_secs(600)
    }

    async fn collect(&self) -> SignageResult<()> {
        for location in self.store.list_locations(None)? {
            let (Some(lat), Some(lon)) = (location.lat, location.lon) else {
                continue;
            };
            let result = self
                .http
                .get(&self.url)
                .query(&[("lat", lat), ("lon", lon)])
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(response) => match response.json::<WeatherResponse>().await {
                    Ok(weather) => self.cache.update(&location.id, |bag| {
                        bag.weather = Some(WeatherSignals {
                            condition: weather.condition.clone(),
                            temp_c: weather.temp_c,
                        });
                    }),
                    Err(e) => {
                        log::warn!("[Collector] weather parse failed for {}: {e}", location.id);
                    }
                },
                Err(e) => {
                    // Keep the stale reading.
                    log::warn!("[Collector] weather poll failed for {}: {e}", location.id);
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct OccupancyResponse {
    occupancy: f32,
}

/// Polls the occupancy endpoint per location every minute.
///
/// A location whose poll fails and that has no cached value falls back to
/// the global average across the other locations.
pub struct OccupancyCollector {
    store: Arc<Store>,
    cache: Arc<SignalsCache>,
    http: reqwest::Client,
    url: String,
}

impl OccupancyCollector {
    pub fn new(store: Arc<Store>, cache: Arc<SignalsCache>, http: reqwest::Client, url: String) -> Self {
        Self {
            store,
            cache,
            http,
            url,
        }
    }
}

#[async_trait]
impl Collector for OccupancyCollector {
    fn name(&self) -> &'static str {
        "occupancy"
    }

    fn cadence(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn collect(&self) -> SignageResult<()> {
        let locations = self.store.list_locations(None)?;
        let mut failed: Vec<String> = Vec::new();

        for location in &locations {
            let result = self
                .http
                .get(&self.url)
                .query(&[("location", location.id.as_str())])
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(response) => match response.json::<OccupancyResponse>().await {
                    Ok(reading) => self.cache.update(&location.id, |bag| {
                        bag.occupancy = Some(reading.occupancy.clamp(0.0, 1.0));
                    }),
                    Err(_) => failed.push(location.id.clone()),
                },
                Err(e) => {
                    log::warn!("[Collector] occupancy poll failed for {}: {e}", location.id);
                    failed.push(location.id.clone());
                }
            }
        }

        // Fallback: failures without a cached value take the global average.
        if !failed.is_empty() {
            let known: Vec<f32> = self
                .cache
                .all()
                .iter()
                .filter_map(|(_, bag)| bag.occupancy)
                .collect();
            if !known.is_empty() {
                let average = known.iter().sum::<f32>() / known.len() as f32;
                for id in failed {
                    self.cache.update(&id, |bag| {
                        if bag.occupancy.is_none() {
                            bag.occupancy = Some(average);
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SecurityResponse {
    level: u8,
}

/// Polls the security endpoint per location every thirty seconds, keeping
/// the last known level on failure.
pub struct SecurityCollector {
    store: Arc<Store>,
    cache: Arc<SignalsCache>,
    http: reqwest::Client,
    url: String,
}

impl SecurityCollector {
    pub fn new(store: Arc<Store>, cache: Arc<SignalsCache>, http: reqwest::Client, url: String) -> Self {
        Self {
            store,
            cache,
            http,
            url,
        }
    }
}

#[async_trait]
impl Collector for SecurityCollector {
    fn name(&self) -> &'static str {
        "security"
    }

    fn cadence(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn collect(&self) -> SignageResult<()> {
        for location in self.store.list_locations(None)? {
            let result = self
                .http
                .get(&self.url)
                .query(&[("location", location.id.as_str())])
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(response) => {
                    if let Ok(reading) = response.json::<SecurityResponse>().await {
                        self.cache.update(&location.id, |bag| {
                            bag.security_level = Some(reading.level.min(3));
                        });
                    }
                }
                Err(e) => {
                    log::warn!("[Collector] security poll failed for {}: {e}", location.id);
                }
            }
        }
        Ok(())
    }
}

/// Calendar feed. Stubbed: the bag's calendar list stays empty.
pub struct CalendarCollector;

#[async_trait]
impl Collector for CalendarCollector {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn cadence(&self) -> Duration {
        Duration::from_secs(3600)
    }

    async fn collect(&self) -> SignageResult<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streamed collectors
// ─────────────────────────────────────────────────────────────────────────────

/// One newline-delimited JSON frame from a streamed source.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFrame {
    pub location: String,
    #[serde(default)]
    pub level: Option<f32>,
    #[serde(default)]
    pub spike_freq: Option<f32>,
    #[serde(default)]
    pub sustained_loud: Option<bool>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// Applies one stream frame to the cache.
pub fn apply_stream_frame(cache: &SignalsCache, frame: &StreamFrame) {
    if let Some(level) = frame.level {
        cache.update(&frame.location, |bag| {
            bag.audio = Some(AudioSignals {
                level: level.clamp(0.0, 1.0),
                spike_freq: frame.spike_freq.unwrap_or(0.0).clamp(0.0, 1.0),
                sustained_loud: frame.sustained_loud.unwrap_or(false),
            });
        });
    }
    if let Some(count) = frame.count {
        cache.update(&frame.location, |bag| bag.people_count = Some(count));
    }
}

/// Push-style source (audio features, people count) read over a streaming
/// HTTP response with reconnect backoff.
pub struct StreamedCollector {
    cache: Arc<SignalsCache>,
    http: reqwest::Client,
    url: String,
    label: &'static str,
    reconnect_backoff: Duration,
}

impl StreamedCollector {
    pub fn new(
        cache: Arc<SignalsCache>,
        http: reqwest::Client,
        url: String,
        label: &'static str,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            cache,
            http,
            url,
            label,
            reconnect_backoff,
        }
    }

    /// Runs until cancelled, reconnecting after every stream end or error.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.read_stream() => {
                    if let Err(e) = result {
                        log::warn!("[Collector] {} stream ended: {e}", self.label);
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.reconnect_backoff) => {}
            }
        }
    }

    async fn read_stream(&self) -> SignageResult<()> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SignageError::DependencyFailed(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SignageError::DependencyFailed(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match serde_json::from_slice::<StreamFrame>(&line[..line.len() - 1]) {
                    Ok(frame) => apply_stream_frame(&self.cache, &frame),
                    Err(e) => log::debug!("[Collector] {} bad frame: {e}", self.label),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, BOOTSTRAP_TENANT};
    use serde_json::Value;

    fn seed_location(store: &Store, id: &str, tz: Option<&str>) {
        store
            .insert_location(&Location {
                id: id.into(),
                client_id: BOOTSTRAP_TENANT.into(),
                name: id.into(),
                address: None,
                lat: Some(51.5),
                lon: Some(-0.1),
                timezone: tz.map(Into::into),
                config: Value::Null,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn time_collector_populates_every_location() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_location(&store, "loc-1", Some("UTC"));
        seed_location(&store, "loc-2", Some("Asia/Tokyo"));
        let cache = Arc::new(SignalsCache::new());

        let collector = TimeCollector::new(Arc::clone(&store), Arc::clone(&cache));
        collector.collect().await.unwrap();

        assert!(cache.get("loc-1").is_some());
        assert!(cache.get("loc-2").is_some());
        // The two zones differ by nine hours, so the signals must differ.
        let a = cache.get("loc-1").unwrap().time.hour;
        let b = cache.get("loc-2").unwrap().time.hour;
        assert!((a - b).abs() > 0.1);
    }

    #[tokio::test]
    async fn time_collector_drops_removed_locations() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_location(&store, "loc-1", None);
        let cache = Arc::new(SignalsCache::new());
        let collector = TimeCollector::new(Arc::clone(&store), Arc::clone(&cache));

        collector.collect().await.unwrap();
        assert!(cache.get("loc-1").is_some());

        store.delete_location("loc-1").unwrap();
        collector.collect().await.unwrap();
        assert!(cache.get("loc-1").is_none());
    }

    #[test]
    fn stream_frames_update_audio_and_count() {
        let cache = SignalsCache::new();

        let frame: StreamFrame = serde_json::from_str(
            r#"{"location":"loc-1","level":0.8,"spikeFreq":0.4,"sustainedLoud":true}"#,
        )
        .unwrap();
        apply_stream_frame(&cache, &frame);

        let frame: StreamFrame =
            serde_json::from_str(r#"{"location":"loc-1","count":14}"#).unwrap();
        apply_stream_frame(&cache, &frame);

        let bag = cache.get("loc-1").unwrap();
        let audio = bag.audio.unwrap();
        assert!((audio.level - 0.8).abs() < 1e-6);
        assert!(audio.sustained_loud);
        assert_eq!(bag.people_count, Some(14));
    }

    #[test]
    fn stream_frame_clamps_levels() {
        let cache = SignalsCache::new();
        let frame: StreamFrame =
            serde_json::from_str(r#"{"location":"loc-1","level":7.0}"#).unwrap();
        apply_stream_frame(&cache, &frame);
        assert_eq!(cache.get("loc-1").unwrap().audio.unwrap().level, 1.0);
    }

    #[test]
    fn cache_update_creates_bag_on_demand() {
        let cache = SignalsCache::new();
        cache.update("loc-x", |bag| bag.security_level = Some(2));
        assert_eq!(cache.get("loc-x").unwrap().security_level, Some(2));
    }
}
