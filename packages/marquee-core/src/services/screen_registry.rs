//! Screen connection tracking and management.
//!
//! The registry owns every piece of per-screen runtime state:
//!
//! - Connected-screen map: screen id → channel handle. Key present iff the
//!   screen is reachable for push.
//! - Screen modes map: screen id → signage/interactive, seeded on connect.
//! - Screenshot cache: last captured frame per screen.
//! - Per-screen bounded outbound queues with drop-oldest overflow.
//!
//! Connection handlers hold a [`ConnectionGuard`] for RAII cleanup: a
//! dropped guard flips the row offline and removes the map entry, even if
//! the handler panics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::SignageResult;
use crate::events::{EventEmitter, RegistryEvent, ServerMessage};
use crate::model::{Screen, ScreenMode, ScreenStatus};
use crate::store::{Store, SETTING_OFFLINE_THRESHOLD_MINUTES};
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Outbound queue
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded per-screen message queue with drop-oldest overflow.
///
/// Per-screen ordering is preserved; a slow screen can never block the
/// dispatcher. There are no retries: the next state broadcast re-establishes
/// anything dropped.
pub struct OutboundQueue {
    inner: Mutex<VecDeque<ServerMessage>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl OutboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues a message, dropping the oldest entry on overflow.
    pub fn push(&self, message: ServerMessage) {
        {
            let mut queue = self.inner.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    /// Dequeues the next message, waiting until one is available.
    pub async fn pop(&self) -> ServerMessage {
        loop {
            if let Some(message) = self.inner.lock().pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }

    /// Messages dropped to overflow so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Per-connection runtime handle stored in the connected-screen map.
struct ScreenHandle {
    queue: Arc<OutboundQueue>,
    cancel: CancellationToken,
}

/// Cached screenshot for one screen.
#[derive(Debug, Clone)]
pub struct ScreenshotSlot {
    /// Base64-encoded image as the screen reported it.
    pub image: String,
    /// Epoch milliseconds of capture.
    pub timestamp: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Authoritative runtime view of the screen fleet.
pub struct ScreenRegistry {
    store: Arc<Store>,
    emitter: Arc<dyn EventEmitter>,
    connected: DashMap<String, ScreenHandle>,
    modes: DashMap<String, ScreenMode>,
    screenshots: DashMap<String, ScreenshotSlot>,
    queue_bound: usize,
    offline_threshold_minutes_default: u64,
    /// Global token: cancelled on shutdown, replaced after close_all so new
    /// connections can still be accepted.
    global_cancel: RwLock<CancellationToken>,
}

impl ScreenRegistry {
    /// Creates a registry. `queue_bound` caps each per-screen queue.
    pub fn new(
        store: Arc<Store>,
        emitter: Arc<dyn EventEmitter>,
        queue_bound: usize,
        offline_threshold_minutes: u64,
    ) -> Self {
        Self {
            store,
            emitter,
            connected: DashMap::new(),
            modes: DashMap::new(),
            screenshots: DashMap::new(),
            queue_bound,
            offline_threshold_minutes_default: offline_threshold_minutes,
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers (or re-registers) a screen and opens its push channel.
    ///
    /// Idempotent on the row: the screen's self-reported id upserts. A
    /// previous live channel for the same id is force-closed first.
    pub fn register_connection(
        self: &Arc<Self>,
        screen: &Screen,
    ) -> SignageResult<ConnectionGuard> {
        let stored = self.store.upsert_screen(screen)?;

        // Replace any stale channel for this id.
        if let Some((_, old)) = self.connected.remove(&stored.id) {
            log::info!("[Registry] Replacing live channel for {}", stored.id);
            old.cancel.cancel();
        }

        let queue = Arc::new(OutboundQueue::new(self.queue_bound));
        let cancel = self.global_cancel.read().child_token();
        self.connected.insert(
            stored.id.clone(),
            ScreenHandle {
                queue: Arc::clone(&queue),
                cancel: cancel.clone(),
            },
        );
        self.modes
            .entry(stored.id.clone())
            .or_insert(ScreenMode::Signage);

        log::info!(
            "[Registry] Screen connected: {} (total: {})",
            stored.id,
            self.connected.len()
        );
        self.emitter.emit_registry(RegistryEvent::ScreenConnected {
            screen_id: stored.id.clone(),
            timestamp: now_millis(),
        });
        self.broadcast_registry_change();

        Ok(ConnectionGuard {
            screen_id: stored.id,
            queue,
            cancel,
            registry: Arc::clone(self),
        })
    }

    /// Heartbeat: refreshes liveness and optionally the screenshot slot.
    pub fn heartbeat(&self, screen_id: &str, screenshot: Option<String>) -> SignageResult<()> {
        self.store.touch_screen(screen_id, now_millis())?;
        if let Some(image) = screenshot {
            self.store_screenshot(screen_id, image);
        }
        Ok(())
    }

    /// Stores a captured frame, replacing the previous one.
    pub fn store_screenshot(&self, screen_id: &str, image: String) {
        self.screenshots.insert(
            screen_id.to_string(),
            ScreenshotSlot {
                image,
                timestamp: now_millis(),
            },
        );
    }

    /// Returns the last captured frame for a screen, if any.
    pub fn screenshot(&self, screen_id: &str) -> Option<ScreenshotSlot> {
        self.screenshots.get(screen_id).map(|r| r.value().clone())
    }

    /// Records a screen-reported mode change and notifies listeners.
    pub fn apply_mode_update(&self, screen_id: &str, mode: ScreenMode) {
        self.modes.insert(screen_id.to_string(), mode);
        self.broadcast_all(ServerMessage::ScreensModeUpdate {
            screen_id: screen_id.to_string(),
            mode,
            timestamp: now_millis(),
        });
    }

    /// Removes a screen from the connected map and flips its row offline.
    fn disconnect(&self, screen_id: &str, queue: &Arc<OutboundQueue>) {
        // Only tear down if the map still points at this exact channel; a
        // reconnect may already have replaced it.
        let removed = self
            .connected
            .remove_if(screen_id, |_, handle| Arc::ptr_eq(&handle.queue, queue))
            .is_some();
        if !removed {
            return;
        }
        if let Err(e) = self
            .store
            .set_screen_status(screen_id, ScreenStatus::Offline, now_millis())
        {
            log::warn!("[Registry] Failed to mark {screen_id} offline: {e}");
        }
        log::info!(
            "[Registry] Screen disconnected: {} (remaining: {})",
            screen_id,
            self.connected.len()
        );
        self.emitter.emit_registry(RegistryEvent::ScreenOffline {
            screen_id: screen_id.to_string(),
            timestamp: now_millis(),
        });
        self.broadcast_registry_change();
    }

    /// Sweeps online rows whose last heartbeat predates the offline
    /// threshold. Stale entries lose their channel and flip offline.
    pub fn sweep_offline(&self) -> SignageResult<usize> {
        let threshold_minutes = self.store.get_setting_u64(
            SETTING_OFFLINE_THRESHOLD_MINUTES,
            self.offline_threshold_minutes_default,
        );
        let cutoff = now_millis().saturating_sub(threshold_minutes * 60 * 1000);
        let stale = self.store.stale_online_screens(cutoff)?;
        for screen_id in &stale {
            if let Some((_, handle)) = self.connected.remove(screen_id) {
                handle.cancel.cancel();
            }
            self.store.mark_screen_offline(screen_id)?;
            log::warn!("[Registry] Screen {screen_id} missed heartbeats, marked offline");
            self.emitter.emit_registry(RegistryEvent::ScreenOffline {
                screen_id: screen_id.clone(),
                timestamp: now_millis(),
            });
        }
        if !stale.is_empty() {
            self.broadcast_registry_change();
        }
        Ok(stale.len())
    }

    /// Deletes a screen row, closing its channel if connected.
    pub fn delete_screen(&self, screen_id: &str) -> SignageResult<()> {
        if let Some((_, handle)) = self.connected.remove(screen_id) {
            handle.cancel.cancel();
        }
        self.modes.remove(screen_id);
        self.screenshots.remove(screen_id);
        self.store.delete_screen(screen_id)?;
        self.broadcast_registry_change();
        Ok(())
    }

    /// Force-closes every connection. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connected.len();
        if count > 0 {
            log::info!("[Registry] Force-closing {count} screen channel(s)");
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Queues a message for one screen. Returns false if not connected.
    pub fn send_to(&self, screen_id: &str, message: ServerMessage) -> bool {
        match self.connected.get(screen_id) {
            Some(handle) => {
                handle.queue.push(message);
                true
            }
            None => false,
        }
    }

    /// Queues a message for every connected screen.
    pub fn broadcast_all(&self, message: ServerMessage) {
        for entry in self.connected.iter() {
            entry.value().queue.push(message.clone());
        }
    }

    /// Emits a `screens:update` to every connected listener and the
    /// internal event seam.
    pub fn broadcast_registry_change(&self) {
        self.emitter.emit_registry(RegistryEvent::CatalogChanged {
            timestamp: now_millis(),
        });
        self.broadcast_all(ServerMessage::ScreensUpdate {
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the screen has a live channel.
    pub fn is_connected(&self, screen_id: &str) -> bool {
        self.connected.contains_key(screen_id)
    }

    /// Number of live channels.
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Current mode of a screen (defaults to signage).
    pub fn mode_of(&self, screen_id: &str) -> ScreenMode {
        self.modes
            .get(screen_id)
            .map(|r| *r.value())
            .unwrap_or_default()
    }

    /// Overlays runtime state (connected, mode) onto persisted rows.
    pub fn decorate(&self, screens: &mut [Screen]) {
        for screen in screens {
            screen.connected = self.is_connected(&screen.id);
            screen.current_mode = self.mode_of(&screen.id);
        }
    }

    /// Per-screen dropped-message counters for the dashboard.
    pub fn dropped_messages(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .connected
            .iter()
            .map(|e| (e.key().clone(), e.value().queue.dropped_count().into()))
            .collect();
        Value::Object(map)
    }
}

/// RAII guard held by a connection handler.
///
/// Dropping the guard removes the screen from the connected map and flips
/// its row offline, even if the handler exits via panic.
pub struct ConnectionGuard {
    screen_id: String,
    queue: Arc<OutboundQueue>,
    cancel: CancellationToken,
    registry: Arc<ScreenRegistry>,
}

impl ConnectionGuard {
    /// The connected screen's id.
    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    /// The outbound queue the handler drains into the socket.
    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Token cancelled when the connection is force-closed.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.screen_id, &self.queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::model::BOOTSTRAP_TENANT;

    pub(crate) fn make_registry() -> Arc<ScreenRegistry> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        Arc::new(ScreenRegistry::new(
            store,
            Arc::new(NoopEventEmitter),
            64,
            10,
        ))
    }

    pub(crate) fn make_screen(id: &str) -> Screen {
        Screen {
            id: id.into(),
            client_id: BOOTSTRAP_TENANT.into(),
            name: format!("Screen {id}"),
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
            current_mode: ScreenMode::Signage,
        }
    }

    #[test]
    fn register_twice_keeps_one_row_and_channel() {
        let registry = make_registry();
        let first = registry.register_connection(&make_screen("scr-1")).unwrap();
        let second = registry.register_connection(&make_screen("scr-1")).unwrap();

        assert_eq!(registry.connected_count(), 1);
        // The first guard's channel was replaced and cancelled.
        assert!(first.cancel_token().is_cancelled());
        assert!(!second.cancel_token().is_cancelled());

        // Dropping the superseded guard must not tear down the live channel.
        drop(first);
        assert!(registry.is_connected("scr-1"));

        drop(second);
        assert!(!registry.is_connected("scr-1"));
    }

    #[test]
    fn drop_guard_flips_offline() {
        let registry = make_registry();
        let guard = registry.register_connection(&make_screen("scr-1")).unwrap();
        assert!(registry.is_connected("scr-1"));
        drop(guard);
        assert!(!registry.is_connected("scr-1"));
        let screen = registry.store.get_screen("scr-1").unwrap();
        assert_eq!(screen.status, ScreenStatus::Offline);
    }

    #[test]
    fn queue_drops_oldest_on_overflow() {
        let queue = OutboundQueue::new(2);
        queue.push(ServerMessage::ScreensUpdate { timestamp: 1 });
        queue.push(ServerMessage::ScreensUpdate { timestamp: 2 });
        queue.push(ServerMessage::ScreensUpdate { timestamp: 3 });

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
        // The survivor at the head is the second message.
        let head = queue.inner.lock().pop_front().unwrap();
        match head {
            ServerMessage::ScreensUpdate { timestamp } => assert_eq!(timestamp, 2),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn queue_pop_preserves_order() {
        let queue = Arc::new(OutboundQueue::new(8));
        queue.push(ServerMessage::ScreensUpdate { timestamp: 1 });
        queue.push(ServerMessage::ScreensUpdate { timestamp: 2 });

        for expected in [1, 2] {
            match queue.pop().await {
                ServerMessage::ScreensUpdate { timestamp } => assert_eq!(timestamp, expected),
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn sweep_marks_stale_screens_offline() {
        let registry = make_registry();
        let _guard = registry.register_connection(&make_screen("scr-1")).unwrap();

        // Backdate the heartbeat far past any threshold.
        registry.store.touch_screen("scr-1", 1).unwrap();
        let swept = registry.sweep_offline().unwrap();

        assert_eq!(swept, 1);
        assert!(!registry.is_connected("scr-1"));
        assert_eq!(
            registry.store.get_screen("scr-1").unwrap().status,
            ScreenStatus::Offline
        );
    }

    #[test]
    fn mode_updates_tracked() {
        let registry = make_registry();
        let _guard = registry.register_connection(&make_screen("scr-1")).unwrap();
        assert_eq!(registry.mode_of("scr-1"), ScreenMode::Signage);

        registry.apply_mode_update("scr-1", ScreenMode::Interactive);
        assert_eq!(registry.mode_of("scr-1"), ScreenMode::Interactive);
    }

    #[test]
    fn screenshot_slot_replaced() {
        let registry = make_registry();
        registry.store_screenshot("scr-1", "aaaa".into());
        registry.store_screenshot("scr-1", "bbbb".into());
        assert_eq!(registry.screenshot("scr-1").unwrap().image, "bbbb");
        assert!(registry.screenshot("scr-2").is_none());
    }
}
