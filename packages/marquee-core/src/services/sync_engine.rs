//! Coordinated playback across the screens of a sync group.
//!
//! Responsibilities:
//! - Run lifecycle: play, stop, seek, with one cancellable timer task per
//!   playing group
//! - Mode-aware payload fan-out (mirror, complementary, span)
//! - Membership changes with catch-up state for late joiners
//! - Teardown on group deletion (timer cancelled, members unassigned)
//!
//! Ticks for one group are serialized through the run store's generation
//! stamp: control operations replace the stamp, and a timer task that
//! observes a stale stamp exits without dispatching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{SignageError, SignageResult};
use crate::events::{EventEmitter, ServerMessage, SyncEvent};
use crate::model::{ContentType, PlaylistItem, PushEnvelope, PushKind, SyncGroup, SyncMode};
use crate::services::{ScreenRegistry, SyncRun, SyncRunStore};
use crate::store::Store;
use crate::utils::now_millis;

/// Drives lockstep playback for every playing sync group.
pub struct SyncEngine {
    store: Arc<Store>,
    registry: Arc<ScreenRegistry>,
    runs: Arc<SyncRunStore>,
    emitter: Arc<dyn EventEmitter>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl SyncEngine {
    /// Creates the engine. `shutdown` cancels every pending timer.
    pub fn new(
        store: Arc<Store>,
        registry: Arc<ScreenRegistry>,
        emitter: Arc<dyn EventEmitter>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            registry,
            runs: Arc::new(SyncRunStore::new()),
            emitter,
            next_generation: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Read access to the run store (status endpoints, ws ack handling).
    pub fn runs(&self) -> &Arc<SyncRunStore> {
        &self.runs
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Controls
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts (or restarts) playback for a group.
    ///
    /// Loads the named playlist or the group default. Rejects with
    /// `EMPTY_PLAYLIST` when the item list is empty and `NOT_FOUND` when
    /// the group or playlist does not exist. An already playing group is
    /// stopped first.
    pub fn play(self: &Arc<Self>, group_id: &str, playlist_id: Option<&str>) -> SignageResult<SyncRun> {
        let group = self.store.get_sync_group(group_id)?;

        let playlist_id = playlist_id
            .map(str::to_string)
            .or_else(|| group.playlist_id.clone())
            .ok_or_else(|| {
                SignageError::NotFound(format!("sync group {group_id} has no playlist"))
            })?;
        let playlist = self.store.get_playlist(&playlist_id)?;
        if playlist.items.is_empty() {
            return Err(SignageError::EmptyPlaylist(playlist_id));
        }

        // Restart semantics: cancel the current run before installing a new one.
        self.runs.remove(group_id);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let run = SyncRun {
            group_id: group_id.to_string(),
            playlist_id: playlist_id.clone(),
            mode: group.mode,
            items: playlist.items,
            item_index: 0,
            started_at: now_millis(),
            playing: true,
            generation,
            cancel: cancel.clone(),
        };
        self.runs.insert(run.clone());

        log::info!(
            "[Sync] Group {group_id} playing {playlist_id} ({} items, {:?})",
            run.items.len(),
            group.mode
        );
        self.emitter.emit_sync(SyncEvent::Started {
            group_id: group_id.to_string(),
            playlist_id,
            timestamp: now_millis(),
        });

        // Item 0 goes out immediately; the timer drives every later advance.
        self.dispatch_content(&group, &run);
        self.spawn_timer(group_id.to_string(), generation, run.items[0].duration, cancel);

        Ok(run)
    }

    /// Stops playback. Idempotent: stopping an idle group is a no-op.
    pub fn stop(&self, group_id: &str) -> SignageResult<bool> {
        // The group must exist even when idle so callers learn about typos.
        self.store.get_sync_group(group_id)?;
        let stopped = self.runs.remove(group_id).is_some();
        if stopped {
            log::info!("[Sync] Group {group_id} stopped");
            self.emitter.emit_sync(SyncEvent::Stopped {
                group_id: group_id.to_string(),
                timestamp: now_millis(),
            });
        }
        Ok(stopped)
    }

    /// Repositions a playing group at `item_index` and re-broadcasts
    /// state. Valid only while the group is playing.
    pub fn seek(self: &Arc<Self>, group_id: &str, item_index: usize) -> SignageResult<SyncRun> {
        let run = self
            .runs
            .get(group_id)
            .ok_or_else(|| SignageError::InvalidInput(format!("group {group_id} is not playing")))?;
        if item_index >= run.items.len() {
            return Err(SignageError::InvalidInput(format!(
                "itemIndex {item_index} out of range (playlist has {} items)",
                run.items.len()
            )));
        }

        // Replace the pending timer with one scheduled from the new item.
        run.cancel.cancel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let group = self.store.get_sync_group(group_id)?;

        let mut run = run;
        run.item_index = item_index;
        run.started_at = now_millis();
        run.generation = generation;
        run.cancel = cancel.clone();
        self.runs.insert(run.clone());

        self.broadcast_to_members(
            group_id,
            ServerMessage::SyncSeek {
                group_id: group_id.to_string(),
                item_index,
                timestamp: now_millis(),
            },
        );
        self.dispatch_content(&group, &run);
        self.spawn_timer(
            group_id.to_string(),
            generation,
            run.items[item_index].duration,
            cancel,
        );
        Ok(run)
    }

    /// Attaches screens to a group. A playing group immediately sends the
    /// newcomers a catch-up `sync:state` plus their current content.
    pub fn attach_screens(&self, group_id: &str, screen_ids: &[String]) -> SignageResult<()> {
        let group = self.store.get_sync_group(group_id)?;
        self.store.attach_screens_to_group(group_id, screen_ids)?;
        self.registry.broadcast_registry_change();

        if let Some(run) = self.runs.get(group_id) {
            let members = self.store.sync_group_members(group_id)?;
            let total = members.len();
            for screen_id in screen_ids {
                let Some(position) = members.iter().position(|m| m == screen_id) else {
                    continue;
                };
                self.registry.send_to(
                    screen_id,
                    ServerMessage::SyncState {
                        group_id: group_id.to_string(),
                        item_index: run.item_index,
                        started_at: run.started_at,
                        mode: run.mode,
                        screen_index: position,
                        total_screens: total,
                        playing: true,
                    },
                );
                let message = member_content(&group, &run, position, total);
                self.registry.send_to(screen_id, message);
            }
        }
        Ok(())
    }

    /// Detaches one screen from its group.
    pub fn detach_screen(&self, screen_id: &str) -> SignageResult<()> {
        self.store.detach_screen_from_group(screen_id)?;
        self.registry.broadcast_registry_change();
        Ok(())
    }

    /// Deletes a group: cancels its timer, unassigns members, removes the
    /// row and notifies listeners.
    pub fn delete_group(&self, group_id: &str) -> SignageResult<()> {
        self.store.get_sync_group(group_id)?;
        if self.runs.remove(group_id).is_some() {
            self.emitter.emit_sync(SyncEvent::Stopped {
                group_id: group_id.to_string(),
                timestamp: now_millis(),
            });
        }
        self.store.clear_sync_group_members(group_id)?;
        self.store.delete_sync_group(group_id)?;
        self.registry.broadcast_registry_change();
        Ok(())
    }

    /// Records a tick acknowledgement. Reserved input for drift handling;
    /// the baseline trusts timers and only keeps the bookkeeping.
    pub fn record_ack(&self, group_id: &str, screen_id: &str, item_index: usize) {
        self.runs.record_ack(group_id, screen_id, item_index);
    }

    /// Cancels every run. Used on shutdown.
    pub fn stop_all(&self) -> usize {
        self.runs.clear_all()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timer + fan-out
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawns the one-shot advance timer for a run.
    fn spawn_timer(
        self: &Arc<Self>,
        group_id: String,
        generation: u64,
        first_duration_secs: u32,
        cancel: CancellationToken,
    ) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut duration_secs = first_duration_secs;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(u64::from(duration_secs))) => {}
                }
                // A panicking advance must not kill the run; keep the
                // cadence and try again on the next fire.
                let fired = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    engine.on_timer_fired(&group_id, generation)
                }));
                match fired {
                    Ok(Some(next)) => duration_secs = next,
                    Ok(None) => return,
                    Err(_) => {
                        log::error!("[Sync] Advance panicked for group {group_id}");
                    }
                }
            }
        });
    }

    /// Advances the run and fans out tick + content. Returns the next
    /// item's duration, or `None` when the run is gone or superseded.
    fn on_timer_fired(&self, group_id: &str, generation: u64) -> Option<u32> {
        let (item_index, duration) = self.runs.advance(group_id, generation)?;
        let run = self.runs.get(group_id)?;
        let group = match self.store.get_sync_group(group_id) {
            Ok(group) => group,
            Err(_) => {
                // Row vanished mid-run; the delete path clears state.
                self.runs.remove(group_id);
                return None;
            }
        };

        self.broadcast_to_members(
            group_id,
            ServerMessage::SyncTick {
                group_id: group_id.to_string(),
                item_index,
                timestamp: now_millis(),
                duration,
            },
        );
        self.dispatch_content(&group, &run);
        self.emitter.emit_sync(SyncEvent::Advanced {
            group_id: group_id.to_string(),
            item_index,
            timestamp: now_millis(),
        });
        Some(duration)
    }

    /// Sends a message to every connected member of a group.
    fn broadcast_to_members(&self, group_id: &str, message: ServerMessage) {
        let members = match self.store.sync_group_members(group_id) {
            Ok(members) => members,
            Err(e) => {
                log::warn!("[Sync] Failed to load members of {group_id}: {e}");
                return;
            }
        };
        for member in members {
            self.registry.send_to(&member, message.clone());
        }
    }

    /// Fans the mode-aware content payloads out to every connected member.
    fn dispatch_content(&self, group: &SyncGroup, run: &SyncRun) {
        let members = match self.store.sync_group_members(&group.id) {
            Ok(members) => members,
            Err(e) => {
                log::warn!("[Sync] Failed to load members of {}: {e}", group.id);
                return;
            }
        };
        let total = members.len();
        for (position, member) in members.iter().enumerate() {
            let message = member_content(group, run, position, total);
            self.registry.send_to(member, message);
        }
    }
}

/// Builds the content message one member receives for the current advance.
///
/// - mirror: every member gets the item at `item_index`
/// - complementary: member `i` gets `(item_index + i) mod N_items`
/// - span: every member gets `item_index` plus a viewport descriptor
fn member_content(
    group: &SyncGroup,
    run: &SyncRun,
    screen_index: usize,
    total_screens: usize,
) -> ServerMessage {
    let item_count = run.items.len();
    let effective_index = match run.mode {
        SyncMode::Mirror | SyncMode::Span => run.item_index,
        SyncMode::Complementary => (run.item_index + screen_index) % item_count,
    };
    let item = &run.items[effective_index];

    let mut content = json!({
        "groupId": group.id,
        "itemIndex": run.item_index,
        "screenIndex": screen_index,
        "totalScreens": total_screens,
        "item": item,
    });
    if run.mode == SyncMode::Span {
        content["viewport"] = json!({
            "screenIndex": screen_index,
            "totalScreens": total_screens,
        });
    }

    ServerMessage::Content {
        envelope: PushEnvelope::new("sync", item_kind(item), content),
    }
}

/// Envelope kind for a playlist item's content type.
fn item_kind(item: &PlaylistItem) -> PushKind {
    match item.content_type {
        ContentType::Video | ContentType::Template => PushKind::Media,
        ContentType::Widget => PushKind::Widget,
        ContentType::Url => PushKind::Url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::model::{Screen, ScreenStatus, BOOTSTRAP_TENANT};
    use crate::services::screen_registry::ConnectionGuard;
    use serde_json::Value;

    struct Fixture {
        store: Arc<Store>,
        registry: Arc<ScreenRegistry>,
        engine: Arc<SyncEngine>,
        guards: Vec<ConnectionGuard>,
    }

    fn make_screen(id: &str) -> Screen {
        Screen {
            id: id.into(),
            client_id: BOOTSTRAP_TENANT.into(),
            name: id.into(),
            group_id: None,
            location_id: None,
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
        }
    }

    /// Three connected screens in group `g1`, playlist `p1` with the given
    /// item durations.
    fn fixture(mode: SyncMode, durations: &[u32]) -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(ScreenRegistry::new(
            Arc::clone(&store),
            Arc::new(NoopEventEmitter),
            64,
            10,
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::new(NoopEventEmitter),
            CancellationToken::new(),
        ));

        store
            .insert_playlist(&crate::store::make_playlist("p1", durations))
            .unwrap();
        store
            .insert_sync_group(&SyncGroup {
                id: "g1".into(),
                client_id: BOOTSTRAP_TENANT.into(),
                name: "Wall".into(),
                mode,
                playlist_id: Some("p1".into()),
                leader_screen_id: None,
                config: Value::Null,
                created_at: 0,
                updated_at: 0,
            })
            .unwrap();

        let mut guards = Vec::new();
        for id in ["s0", "s1", "s2"] {
            guards.push(registry.register_connection(&make_screen(id)).unwrap());
        }
        store
            .attach_screens_to_group(
                "g1",
                &["s0".to_string(), "s1".to_string(), "s2".to_string()],
            )
            .unwrap();

        Fixture {
            store,
            registry,
            engine,
            guards,
        }
    }

    /// Drains a guard's queue, returning the widget names of content
    /// messages and the indices of sync ticks seen.
    async fn drain(guard: &ConnectionGuard) -> (Vec<String>, Vec<usize>) {
        let mut widgets = Vec::new();
        let mut ticks = Vec::new();
        loop {
            let message = tokio::select! {
                biased;
                message = guard.queue().pop() => message,
                _ = tokio::task::yield_now() => break,
            };
            match message {
                ServerMessage::Content { envelope } => {
                    if let Some(widget) = envelope.content["item"]["widget"].as_str() {
                        widgets.push(widget.to_string());
                    }
                }
                ServerMessage::SyncTick { item_index, .. } => ticks.push(item_index),
                _ => {}
            }
        }
        (widgets, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn mirror_mode_all_screens_same_item() {
        let fx = fixture(SyncMode::Mirror, &[10, 20]);
        fx.engine.play("g1", None).unwrap();

        // t=0: everyone shows item 0.
        for guard in &fx.guards {
            let (widgets, _) = drain(guard).await;
            assert_eq!(widgets, vec!["widget-0"]);
        }

        // t≈10s: advance to item 1 on all three.
        tokio::time::sleep(Duration::from_secs(11)).await;
        for guard in &fx.guards {
            let (widgets, ticks) = drain(guard).await;
            assert_eq!(widgets, vec!["widget-1"]);
            assert_eq!(ticks, vec![1]);
        }

        // t≈30s (10 + 20): wrap back to item 0.
        tokio::time::sleep(Duration::from_secs(21)).await;
        for guard in &fx.guards {
            let (widgets, ticks) = drain(guard).await;
            assert_eq!(widgets, vec!["widget-0"]);
            assert_eq!(ticks, vec![0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn complementary_mode_offsets_items() {
        let fx = fixture(SyncMode::Complementary, &[10, 20]);
        fx.engine.play("g1", None).unwrap();

        // t=0: s0/s1/s2 receive items 0/1/0.
        let expectations = ["widget-0", "widget-1", "widget-0"];
        for (guard, expected) in fx.guards.iter().zip(expectations) {
            let (widgets, _) = drain(guard).await;
            assert_eq!(widgets, vec![expected]);
        }

        // After the advance the offsets shift: 1/0/1.
        tokio::time::sleep(Duration::from_secs(11)).await;
        let expectations = ["widget-1", "widget-0", "widget-1"];
        for (guard, expected) in fx.guards.iter().zip(expectations) {
            let (widgets, _) = drain(guard).await;
            assert_eq!(widgets, vec![expected]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn span_mode_carries_viewport() {
        let fx = fixture(SyncMode::Span, &[10]);
        fx.engine.play("g1", None).unwrap();

        for (i, guard) in fx.guards.iter().enumerate() {
            loop {
                match guard.queue().pop().await {
                    ServerMessage::Content { envelope } => {
                        assert_eq!(envelope.content["viewport"]["screenIndex"], i);
                        assert_eq!(envelope.content["viewport"]["totalScreens"], 3);
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_tick() {
        let fx = fixture(SyncMode::Mirror, &[10, 20]);
        fx.engine.play("g1", None).unwrap();
        for guard in &fx.guards {
            drain(guard).await;
        }

        assert!(fx.engine.stop("g1").unwrap());
        assert!(!fx.engine.runs().is_playing("g1"));

        // Run well past the first advance; no tick may arrive.
        tokio::time::sleep(Duration::from_secs(60)).await;
        for guard in &fx.guards {
            let (widgets, ticks) = drain(guard).await;
            assert!(widgets.is_empty());
            assert!(ticks.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_playlist_rejected_without_state() {
        let fx = fixture(SyncMode::Mirror, &[10]);
        fx.store
            .insert_playlist(&crate::store::make_playlist("empty", &[]))
            .unwrap();

        let err = fx.engine.play("g1", Some("empty")).unwrap_err();
        assert_eq!(err.code(), "EMPTY_PLAYLIST");
        assert!(!fx.engine.runs().is_playing("g1"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_group_and_playlist_not_found() {
        let fx = fixture(SyncMode::Mirror, &[10]);
        assert_eq!(
            fx.engine.play("ghost", None).unwrap_err().code(),
            "NOT_FOUND"
        );
        assert_eq!(
            fx.engine.play("g1", Some("ghost")).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replay_restarts_from_item_zero() {
        let fx = fixture(SyncMode::Mirror, &[10, 20]);
        fx.engine.play("g1", None).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fx.engine.runs().get("g1").unwrap().item_index, 1);

        // Re-play stops the old run and starts over.
        fx.engine.play("g1", None).unwrap();
        let run = fx.engine.runs().get("g1").unwrap();
        assert_eq!(run.item_index, 0);

        // The superseded timer never advances the new run.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.engine.runs().get("g1").unwrap().item_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_repositions_and_rebroadcasts() {
        let fx = fixture(SyncMode::Mirror, &[10, 20, 30]);
        fx.engine.play("g1", None).unwrap();
        for guard in &fx.guards {
            drain(guard).await;
        }

        fx.engine.seek("g1", 2).unwrap();
        assert_eq!(fx.engine.runs().get("g1").unwrap().item_index, 2);
        let (widgets, _) = drain(&fx.guards[0]).await;
        assert_eq!(widgets, vec!["widget-2"]);

        // Seek on an idle group is invalid.
        fx.engine.stop("g1").unwrap();
        assert_eq!(
            fx.engine.seek("g1", 0).unwrap_err().code(),
            "INVALID_INPUT"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn attach_during_playback_sends_catchup() {
        let fx = fixture(SyncMode::Mirror, &[10, 20]);
        fx.engine.play("g1", None).unwrap();

        let late = fx.registry.register_connection(&make_screen("s3")).unwrap();
        fx.engine
            .attach_screens("g1", &["s3".to_string()])
            .unwrap();

        let mut saw_state = false;
        let mut saw_content = false;
        loop {
            let message = tokio::select! {
                biased;
                message = late.queue().pop() => message,
                _ = tokio::task::yield_now() => break,
            };
            match message {
                ServerMessage::SyncState {
                    screen_index,
                    total_screens,
                    playing,
                    ..
                } => {
                    assert_eq!(screen_index, 3);
                    assert_eq!(total_screens, 4);
                    assert!(playing);
                    saw_state = true;
                }
                ServerMessage::Content { .. } => saw_content = true,
                _ => {}
            }
        }
        assert!(saw_state);
        assert!(saw_content);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_group_stops_and_unassigns() {
        let fx = fixture(SyncMode::Mirror, &[10]);
        fx.engine.play("g1", None).unwrap();

        fx.engine.delete_group("g1").unwrap();
        assert!(!fx.engine.runs().is_playing("g1"));
        assert!(fx.store.get_sync_group("g1").is_err());
        assert!(fx.store.sync_group_members("g1").unwrap().is_empty());
        assert!(fx
            .store
            .get_screen("s0")
            .unwrap()
            .sync_group
            .is_none());
    }
}
