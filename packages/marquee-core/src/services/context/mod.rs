//! Context / mood engine.
//!
//! Derives a continuous mood vector per location from noisy environmental
//! signals and keeps every connected screen fed with it:
//!
//! - collectors cache raw signals per location ([`collectors`]);
//! - the processor computes a target vector per location ([`processor`]);
//! - an interpolation loop moves the current vector toward the target
//!   every 500 ms with per-component speeds ([`mood`]);
//! - a broadcast loop pushes `context:mood` frames every 2 s.
//!
//! A location seen for the first time starts at `current = target` so a
//! new screen never fades in from neutral.

pub mod collectors;
pub mod mood;
pub mod processor;
pub mod signals;

pub use collectors::{Collector, SignalsCache, StreamedCollector};
pub use mood::{LerpSpeeds, MoodVector};
pub use signals::{SignalBag, TimePeriod};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::events::ServerMessage;
use crate::services::ScreenRegistry;
use crate::utils::now_millis;

/// The engine's shared state and loops.
pub struct ContextEngine {
    registry: Arc<ScreenRegistry>,
    cache: Arc<SignalsCache>,
    current: DashMap<String, MoodVector>,
    target: DashMap<String, MoodVector>,
    speeds: LerpSpeeds,
    lerp_interval: Duration,
    broadcast_interval: Duration,
    shutdown: CancellationToken,
}

impl ContextEngine {
    /// Creates the engine over a signals cache the collectors feed.
    pub fn new(
        registry: Arc<ScreenRegistry>,
        cache: Arc<SignalsCache>,
        lerp_interval_ms: u64,
        broadcast_interval_ms: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            cache,
            current: DashMap::new(),
            target: DashMap::new(),
            speeds: LerpSpeeds::default(),
            lerp_interval: Duration::from_millis(lerp_interval_ms),
            broadcast_interval: Duration::from_millis(broadcast_interval_ms),
            shutdown,
        }
    }

    /// The signals cache fed by collectors.
    pub fn cache(&self) -> &Arc<SignalsCache> {
        &self.cache
    }

    /// Current mood of a location, if it has one.
    pub fn current_mood(&self, location_id: &str) -> Option<MoodVector> {
        self.current.get(location_id).map(|r| *r.value())
    }

    /// Current mood and signals of every location (`/api/context`).
    pub fn snapshot(&self) -> Vec<(String, MoodVector, SignalBag)> {
        self.cache
            .all()
            .into_iter()
            .filter_map(|(id, bag)| self.current_mood(&id).map(|mood| (id, mood, bag)))
            .collect()
    }

    /// Recomputes target vectors from the signals cache.
    ///
    /// A location appearing for the first time starts with
    /// `current = target`.
    pub fn refresh_targets(&self) {
        let bags = self.cache.all();
        let valid: Vec<&String> = bags.iter().map(|(id, _)| id).collect();
        for (location_id, bag) in &bags {
            let target = processor::compute_target(bag);
            self.target.insert(location_id.clone(), target);
            self.current.entry(location_id.clone()).or_insert(target);
        }
        self.current.retain(|id, _| valid.iter().any(|v| *v == id));
        self.target.retain(|id, _| valid.iter().any(|v| *v == id));
    }

    /// One interpolation tick: every current vector moves toward its
    /// target by the per-component speeds.
    pub fn lerp_tick(&self) {
        for mut entry in self.current.iter_mut() {
            if let Some(target) = self.target.get(entry.key()) {
                *entry.value_mut() = entry.value().step_toward(*target.value(), self.speeds);
            }
        }
    }

    /// One broadcast pass: a `context:mood` frame per location to every
    /// connected screen. Fire-and-forget; screens filter by location.
    pub fn broadcast_tick(&self) {
        for (location_id, bag) in self.cache.all() {
            let Some(mood) = self.current_mood(&location_id) else {
                continue;
            };
            self.registry.broadcast_all(ServerMessage::ContextMood {
                location_id,
                mood,
                signals: json!(bag),
                timestamp: now_millis(),
            });
        }
    }

    /// Runs the 500 ms interpolation loop until shutdown.
    pub async fn run_interpolation(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.lerp_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => self.lerp_tick(),
            }
        }
    }

    /// Runs the 2 s target-refresh + broadcast loop until shutdown.
    pub async fn run_broadcast(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.broadcast_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {
                    self.refresh_targets();
                    self.broadcast_tick();
                }
            }
        }
    }
}

/// Runs a poll collector on its cadence until cancelled.
///
/// Every pass executes in its own task so a panic is contained there: the
/// loop logs it and keeps the schedule.
pub async fn run_collector(collector: Arc<dyn Collector>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(collector.cadence());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let pass = Arc::clone(&collector);
        let handle = tokio::spawn(async move { pass.collect().await });
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[Collector] {} pass failed: {e}", collector.name()),
            Err(e) => log::error!("[Collector] {} pass panicked: {e}", collector.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::services::context::signals::{TimeSignals, WeatherSignals};
    use crate::store::Store;
    use chrono::{TimeZone, Utc};

    fn engine() -> Arc<ContextEngine> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(ScreenRegistry::new(
            store,
            Arc::new(NoopEventEmitter),
            64,
            10,
        ));
        Arc::new(ContextEngine::new(
            registry,
            Arc::new(SignalsCache::new()),
            500,
            2000,
            CancellationToken::new(),
        ))
    }

    fn midday() -> TimeSignals {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        TimeSignals::at(now, Some(chrono_tz::UTC))
    }

    #[test]
    fn new_location_starts_at_target() {
        let engine = engine();
        engine.cache().update("loc-1", |bag| bag.time = midday());
        engine.refresh_targets();

        let current = engine.current_mood("loc-1").unwrap();
        let target = *engine.target.get("loc-1").unwrap();
        assert_eq!(current, target);
    }

    #[test]
    fn current_lags_target_after_signal_change() {
        let engine = engine();
        engine.cache().update("loc-1", |bag| bag.time = midday());
        engine.refresh_targets();
        let settled = engine.current_mood("loc-1").unwrap();

        // A security incident jumps the target; current follows gradually.
        engine
            .cache()
            .update("loc-1", |bag| bag.security_level = Some(3));
        engine.refresh_targets();
        let current = engine.current_mood("loc-1").unwrap();
        assert_eq!(current, settled);

        engine.lerp_tick();
        let after_one = engine.current_mood("loc-1").unwrap();
        assert!(after_one.urgency > settled.urgency);
        assert!(after_one.urgency < 1.0);

        for _ in 0..100 {
            engine.lerp_tick();
        }
        let converged = engine.current_mood("loc-1").unwrap();
        assert!(converged.urgency > 0.999);
        assert!(converged.warmth < 0.01);
    }

    #[test]
    fn vanished_location_is_forgotten() {
        let engine = engine();
        engine.cache().update("loc-1", |bag| bag.time = midday());
        engine.refresh_targets();
        assert!(engine.current_mood("loc-1").is_some());

        engine.cache().retain_locations(&[]);
        engine.refresh_targets();
        assert!(engine.current_mood("loc-1").is_none());
    }

    #[test]
    fn snapshot_pairs_mood_with_signals() {
        let engine = engine();
        engine.cache().update("loc-1", |bag| {
            bag.time = midday();
            bag.weather = Some(WeatherSignals {
                condition: "sunny".into(),
                temp_c: 28.0,
            });
        });
        engine.refresh_targets();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (id, mood, bag) = &snapshot[0];
        assert_eq!(id, "loc-1");
        assert!(mood.warmth >= 0.9);
        assert_eq!(bag.weather.as_ref().unwrap().condition, "sunny");
    }
}
