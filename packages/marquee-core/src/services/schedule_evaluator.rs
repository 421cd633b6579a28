//! Periodic selection of the playlist each target should be showing.
//!
//! Every 60 s (and within 5 s of any schedule mutation) the evaluator
//! scans all schedules, picks the winning one per `(tenant, target)` and
//! dispatches changes through the push bus:
//!
//! - winner = highest priority among matching schedules, ties broken by
//!   latest creation time;
//! - a target whose winner changed gets the playlist envelope with
//!   `source="schedule"`;
//! - a target with no match and a previously applied playlist gets a
//!   single clear envelope and is forgotten.
//!
//! Matching evaluates in the target's IANA timezone when the target
//! resolves to exactly one location; otherwise in server-local time.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::SignageResult;
use crate::events::{EventEmitter, ScheduleEvent};
use crate::model::{parse_hhmm, PushEnvelope, PushKind, Schedule};
use crate::services::PushBus;
use crate::store::Store;
use crate::utils::now_millis;

/// Evaluator state and loop.
pub struct ScheduleEvaluator {
    store: Arc<Store>,
    bus: Arc<PushBus>,
    emitter: Arc<dyn EventEmitter>,
    /// `(client_id, target)` → playlist id applied by the last pass.
    last_applied: DashMap<(String, String), String>,
    poke: Notify,
    shutdown: CancellationToken,
    interval_secs: u64,
    poke_delay_ms: u64,
}

/// Local wall-clock parts used for matching: weekday (0 = Sunday) and
/// minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalParts {
    pub weekday: u8,
    pub minutes: u32,
}

/// Whether a schedule matches at the given local time.
pub fn matches_at(schedule: &Schedule, at: LocalParts) -> bool {
    if !schedule.enabled || !schedule.days.contains(&at.weekday) {
        return false;
    }
    let (Ok(start), Ok(end)) = (
        parse_hhmm(&schedule.start_time),
        parse_hhmm(&schedule.end_time),
    ) else {
        return false;
    };
    start <= at.minutes && at.minutes <= end
}

/// Picks the winning schedule: highest priority, then latest created.
pub fn select_winner<'a>(matching: &[&'a Schedule]) -> Option<&'a Schedule> {
    matching
        .iter()
        .copied()
        .max_by_key(|s| (s.priority, s.created_at))
}

impl ScheduleEvaluator {
    /// Creates the evaluator.
    pub fn new(
        store: Arc<Store>,
        bus: Arc<PushBus>,
        emitter: Arc<dyn EventEmitter>,
        shutdown: CancellationToken,
        interval_secs: u64,
        poke_delay_ms: u64,
    ) -> Self {
        Self {
            store,
            bus,
            emitter,
            last_applied: DashMap::new(),
            poke: Notify::new(),
            shutdown,
            interval_secs,
            poke_delay_ms,
        }
    }

    /// Requests a prompt re-evaluation after a schedule mutation.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Runs the evaluation loop until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {}
                _ = self.poke.notified() => {
                    // Small debounce so a burst of mutations evaluates once.
                    tokio::time::sleep(Duration::from_millis(self.poke_delay_ms)).await;
                }
            }
            if let Err(e) = self.evaluate_at(Utc::now()) {
                log::warn!("[Schedule] Evaluation pass failed: {e}");
            }
        }
    }

    /// One full evaluation pass at the given instant.
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> SignageResult<()> {
        let schedules = self.store.list_schedules(None)?;

        // Distinct (tenant, target) pairs across all schedules.
        let mut by_target: HashMap<(String, String), Vec<&Schedule>> = HashMap::new();
        for schedule in &schedules {
            by_target
                .entry((schedule.client_id.clone(), schedule.screen_target.clone()))
                .or_default()
                .push(schedule);
        }

        for ((client_id, target), candidates) in by_target {
            let at = self.local_parts_for_target(&client_id, &target, now);
            let matching: Vec<&Schedule> = candidates
                .into_iter()
                .filter(|s| matches_at(s, at))
                .collect();
            let key = (client_id.clone(), target.clone());

            match select_winner(&matching) {
                Some(winner) => {
                    let already = self
                        .last_applied
                        .get(&key)
                        .map(|r| r.value() == &winner.playlist_id)
                        .unwrap_or(false);
                    if already {
                        continue;
                    }
                    let playlist = self.store.get_playlist(&winner.playlist_id)?;
                    let envelope = PushBus::playlist_envelope("schedule", &playlist);
                    let outcome = self.bus.push(&client_id, &target, envelope)?;
                    log::info!(
                        "[Schedule] Applied playlist {} to {target:?} ({} screens)",
                        playlist.id,
                        outcome.dispatched
                    );
                    self.last_applied.insert(key, winner.playlist_id.clone());
                    self.emitter.emit_schedule(ScheduleEvent::Applied {
                        target,
                        playlist_id: winner.playlist_id.clone(),
                        timestamp: now_millis(),
                    });
                }
                None => {
                    // Clear exactly once: only targets we previously applied.
                    if self.last_applied.remove(&key).is_some() {
                        let envelope =
                            PushEnvelope::new("schedule", PushKind::Clear, json!({}));
                        self.bus.push(&client_id, &target, envelope)?;
                        log::info!("[Schedule] Cleared {target:?}");
                        self.emitter.emit_schedule(ScheduleEvent::Cleared {
                            target,
                            timestamp: now_millis(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Local wall-clock parts for a target.
    ///
    /// When the target resolves to exactly one location with a parseable
    /// IANA zone, that zone wins; otherwise the server's local time.
    fn local_parts_for_target(&self, client_id: &str, target: &str, now: DateTime<Utc>) -> LocalParts {
        match self.target_timezone(client_id, target) {
            Some(tz) => {
                let local = now.with_timezone(&tz);
                LocalParts {
                    weekday: local.weekday().num_days_from_sunday() as u8,
                    minutes: local.hour() * 60 + local.minute(),
                }
            }
            None => {
                let local = now.with_timezone(&chrono::Local);
                LocalParts {
                    weekday: local.weekday().num_days_from_sunday() as u8,
                    minutes: local.hour() * 60 + local.minute(),
                }
            }
        }
    }

    /// The single IANA zone a target resolves to, if unambiguous.
    fn target_timezone(&self, client_id: &str, target: &str) -> Option<Tz> {
        let location_ids: Vec<String> = if target == "all" {
            self.store
                .list_screens(&crate::store::ScreenFilter {
                    client_id: Some(client_id),
                    ..Default::default()
                })
                .ok()?
                .into_iter()
                .filter_map(|s| s.location_id)
                .collect()
        } else if let Ok(location) = self.store.get_location(target) {
            vec![location.id]
        } else if let Ok(screen) = self.store.get_screen(target) {
            screen.location_id.into_iter().collect()
        } else {
            // Group tag: the zones of its members' locations.
            self.store
                .screen_ids_by_group_tag(client_id, target)
                .ok()?
                .into_iter()
                .filter_map(|id| self.store.get_screen(&id).ok())
                .filter_map(|s| s.location_id)
                .collect()
        };

        let mut zones: Vec<String> = location_ids
            .into_iter()
            .filter_map(|id| self.store.get_location(&id).ok())
            .filter_map(|l| l.timezone)
            .collect();
        zones.sort();
        zones.dedup();
        match zones.as_slice() {
            [only] => Tz::from_str(only)
                .map_err(|_| {
                    log::warn!("[Schedule] Unparseable timezone {only:?}, using server-local");
                })
                .ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoopEventEmitter, ServerMessage};
    use crate::model::{Location, PushKind, Screen, ScreenStatus, BOOTSTRAP_TENANT};
    use crate::services::screen_registry::ConnectionGuard;
    use crate::services::ScreenRegistry;
    use chrono::TimeZone;
    use serde_json::Value;

    struct Fixture {
        store: Arc<Store>,
        evaluator: ScheduleEvaluator,
        guards: Vec<ConnectionGuard>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(ScreenRegistry::new(
            Arc::clone(&store),
            Arc::new(NoopEventEmitter),
            64,
            10,
        ));
        let bus = Arc::new(PushBus::new(Arc::clone(&store), Arc::clone(&registry)));
        let evaluator = ScheduleEvaluator::new(
            Arc::clone(&store),
            bus,
            Arc::new(NoopEventEmitter),
            CancellationToken::new(),
            60,
            500,
        );

        // One UTC location so "all" resolves to a deterministic zone.
        store
            .insert_location(&Location {
                id: "loc-utc".into(),
                client_id: BOOTSTRAP_TENANT.into(),
                name: "HQ".into(),
                address: None,
                lat: None,
                lon: None,
                timezone: Some("UTC".into()),
                config: Value::Null,
            })
            .unwrap();

        let mut guards = Vec::new();
        for id in ["scr-1", "scr-2"] {
            let guard = registry
                .register_connection(&Screen {
                    id: id.into(),
                    client_id: BOOTSTRAP_TENANT.into(),
                    name: id.into(),
                    group_id: None,
                    location_id: Some("loc-utc".into()),
                    sync_group: None,
                    screen_type: None,
                    status: ScreenStatus::Online,
                    last_seen: now_millis(),
                    platform: None,
                    resolution: None,
                    orientation: None,
                    capabilities: Value::Null,
                    config: Value::Null,
                    connected: false,
                    current_mode: Default::default(),
                })
                .unwrap();
            guards.push(guard);
        }

        Fixture {
            store,
            evaluator,
            guards,
        }
    }

    fn seed_playlist(store: &Store, id: &str) {
        store
            .insert_playlist(&crate::store::make_playlist(id, &[10]))
            .unwrap();
    }

    fn seed_schedule(store: &Store, id: &str, playlist: &str, window: (&str, &str), days: Vec<u8>, priority: i32) {
        store
            .insert_schedule(&Schedule {
                id: id.into(),
                client_id: BOOTSTRAP_TENANT.into(),
                playlist_id: playlist.into(),
                screen_target: "all".into(),
                start_time: window.0.into(),
                end_time: window.1.into(),
                days,
                priority,
                enabled: true,
                created_at: 0,
                updated_at: 0,
            })
            .unwrap();
    }

    /// Drains applied playlist ids and clear envelopes from one queue.
    fn drain(guard: &ConnectionGuard) -> (Vec<String>, usize) {
        use futures::FutureExt;

        let mut applied = Vec::new();
        let mut clears = 0;
        while let Some(message) = guard.queue().pop().now_or_never() {
            if let ServerMessage::Content { envelope } = message {
                match envelope.kind {
                    PushKind::Playlist => {
                        applied.push(envelope.content["playlistId"].as_str().unwrap().to_string());
                    }
                    PushKind::Clear => clears += 1,
                    _ => {}
                }
            }
        }
        (applied, clears)
    }

    /// Monday 2024-01-01 12:30 UTC.
    fn monday_1230() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn matching_requires_enabled_day_and_window() {
        let schedule = Schedule {
            id: "s".into(),
            client_id: "c".into(),
            playlist_id: "p".into(),
            screen_target: "all".into(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            days: vec![1, 2, 3, 4, 5],
            priority: 0,
            enabled: true,
            created_at: 0,
            updated_at: 0,
        };
        // Monday noon matches.
        assert!(matches_at(&schedule, LocalParts { weekday: 1, minutes: 720 }));
        // Window edges are inclusive.
        assert!(matches_at(&schedule, LocalParts { weekday: 1, minutes: 540 }));
        assert!(matches_at(&schedule, LocalParts { weekday: 1, minutes: 1020 }));
        // Outside window / weekend / disabled all fail.
        assert!(!matches_at(&schedule, LocalParts { weekday: 1, minutes: 1021 }));
        assert!(!matches_at(&schedule, LocalParts { weekday: 0, minutes: 720 }));
        let mut off = schedule.clone();
        off.enabled = false;
        assert!(!matches_at(&off, LocalParts { weekday: 1, minutes: 720 }));
    }

    #[test]
    fn winner_by_priority_then_created() {
        let mut a = Schedule {
            id: "a".into(),
            client_id: "c".into(),
            playlist_id: "pa".into(),
            screen_target: "all".into(),
            start_time: "00:00".into(),
            end_time: "23:59".into(),
            days: vec![0, 1, 2, 3, 4, 5, 6],
            priority: 0,
            enabled: true,
            created_at: 100,
            updated_at: 0,
        };
        let mut b = a.clone();
        b.id = "b".into();
        b.playlist_id = "pb".into();
        b.priority = 10;
        assert_eq!(select_winner(&[&a, &b]).unwrap().id, "b");

        // Tie on priority: newer creation wins.
        b.priority = 0;
        b.created_at = 200;
        assert_eq!(select_winner(&[&a, &b]).unwrap().id, "b");
        a.created_at = 300;
        assert_eq!(select_winner(&[&a, &b]).unwrap().id, "a");
    }

    #[test]
    fn overlapping_windows_apply_higher_priority() {
        let fx = fixture();
        seed_playlist(&fx.store, "p1");
        seed_playlist(&fx.store, "p2");
        // Weekday 09:00-17:00 at priority 0; lunch override at priority 10.
        seed_schedule(&fx.store, "s-base", "p1", ("09:00", "17:00"), vec![1, 2, 3, 4, 5], 0);
        seed_schedule(&fx.store, "s-lunch", "p2", ("12:00", "13:00"), vec![1, 2, 3, 4, 5], 10);

        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p2"]);

        // After the override window ends the base playlist applies.
        let after_lunch = Utc.with_ymd_and_hms(2024, 1, 1, 13, 1, 0).unwrap();
        fx.evaluator.evaluate_at(after_lunch).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p1"]);
    }

    #[test]
    fn unchanged_selection_not_redispatched() {
        let fx = fixture();
        seed_playlist(&fx.store, "p1");
        seed_schedule(&fx.store, "s1", "p1", ("09:00", "17:00"), vec![1], 0);

        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p1"]);
    }

    #[test]
    fn clear_dispatched_exactly_once() {
        let fx = fixture();
        seed_playlist(&fx.store, "p1");
        seed_schedule(&fx.store, "s1", "p1", ("09:00", "17:00"), vec![1], 0);

        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        // Saturday: nothing matches; previously applied target clears once.
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 12, 30, 0).unwrap();
        fx.evaluator.evaluate_at(saturday).unwrap();
        fx.evaluator.evaluate_at(saturday).unwrap();

        let (applied, clears) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p1"]);
        assert_eq!(clears, 1);
    }

    #[test]
    fn priority_change_applies_on_next_pass() {
        let fx = fixture();
        seed_playlist(&fx.store, "p1");
        seed_playlist(&fx.store, "p2");
        seed_schedule(&fx.store, "s1", "p1", ("00:00", "23:59"), vec![1], 5);
        seed_schedule(&fx.store, "s2", "p2", ("00:00", "23:59"), vec![1], 0);

        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p1"]);

        // Raise s2 above s1; the next pass re-applies.
        let mut s2 = fx.store.get_schedule("s2").unwrap();
        s2.priority = 20;
        fx.store.update_schedule("s2", &s2).unwrap();
        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p2"]);
    }

    #[test]
    fn timezone_shifts_matching_window() {
        let fx = fixture();
        // Move the location to Tokyo: UTC 12:30 is 21:30 there.
        let mut loc = fx.store.get_location("loc-utc").unwrap();
        loc.timezone = Some("Asia/Tokyo".into());
        fx.store.update_location("loc-utc", &loc).unwrap();

        seed_playlist(&fx.store, "p1");
        seed_schedule(&fx.store, "s1", "p1", ("09:00", "17:00"), vec![1], 0);

        fx.evaluator.evaluate_at(monday_1230()).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        // 21:30 local: outside the window, nothing applied.
        assert!(applied.is_empty());

        // UTC 01:30 Monday is 10:30 Monday in Tokyo.
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
        fx.evaluator.evaluate_at(early).unwrap();
        let (applied, _) = drain(&fx.guards[0]);
        assert_eq!(applied, vec!["p1"]);
    }
}
