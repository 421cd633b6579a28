//! Targeted message dispatch to connected screens.
//!
//! A target resolves to a concrete set of connected screens in this order:
//!
//! 1. the literal `"all"` → every connected screen of the caller's tenant;
//! 2. a group id (matching `group_id` or `sync_group` on screen rows);
//! 3. a location id;
//! 4. a single screen id.
//!
//! Unmatched targets resolve to zero recipients and still succeed, so
//! dispatch keeps its fire-and-forget, idempotent semantics. A send to one
//! screen is never fatal to the originating call.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SignageResult;
use crate::events::ServerMessage;
use crate::model::{AlertLevel, PushEnvelope, PushKind, ScreenMode};
use crate::services::ScreenRegistry;
use crate::store::{Store, SETTING_ALERT_AUTO_EXPIRE_MS};
use crate::utils::now_millis;

/// Result of one dispatch: how many screens matched the resolved target
/// and how many actually had a message queued.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub dispatched: usize,
    pub matched: usize,
}

/// Fan-out surface shared by the API, the sync engine, the schedule
/// evaluator and the context engine.
pub struct PushBus {
    store: Arc<Store>,
    registry: Arc<ScreenRegistry>,
}

impl PushBus {
    /// Creates a push bus over the registry and catalogue.
    pub fn new(store: Arc<Store>, registry: Arc<ScreenRegistry>) -> Self {
        Self { store, registry }
    }

    /// Resolves a target to connected screen ids, in resolution order.
    pub fn resolve_target(&self, client_id: &str, target: &str) -> SignageResult<Vec<String>> {
        let candidates: Vec<String> = if target == "all" {
            self.store.screen_ids_by_client(client_id)?
        } else {
            let by_group = self.store.screen_ids_by_group_tag(client_id, target)?;
            if !by_group.is_empty() {
                by_group
            } else if self.store.get_location(target).is_ok() {
                self.store.screen_ids_by_location(client_id, target)?
            } else if self
                .store
                .get_screen(target)
                .map(|s| s.client_id == client_id)
                .unwrap_or(false)
            {
                vec![target.to_string()]
            } else {
                Vec::new()
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|id| self.registry.is_connected(id))
            .collect())
    }

    /// Queues a message for the resolved target set.
    pub fn send(
        &self,
        client_id: &str,
        target: &str,
        message: ServerMessage,
    ) -> SignageResult<PushOutcome> {
        let recipients = self.resolve_target(client_id, target)?;
        let matched = recipients.len();
        let mut dispatched = 0;
        for id in &recipients {
            if self.registry.send_to(id, message.clone()) {
                dispatched += 1;
            }
        }
        if matched == 0 {
            log::debug!("[Push] Target {target:?} resolved to no connected screens");
        }
        Ok(PushOutcome {
            dispatched,
            matched,
        })
    }

    /// Pushes a content envelope to a target.
    pub fn push(
        &self,
        client_id: &str,
        target: &str,
        envelope: PushEnvelope,
    ) -> SignageResult<PushOutcome> {
        self.send(client_id, target, ServerMessage::Content { envelope })
    }

    /// Pushes an alert. A missing duration inherits the settings default
    /// so every alert auto-dismisses on the screen.
    pub fn push_alert(
        &self,
        client_id: &str,
        target: &str,
        content: Value,
        level: AlertLevel,
        duration_ms: Option<u64>,
    ) -> SignageResult<PushOutcome> {
        let duration = duration_ms
            .unwrap_or_else(|| self.store.get_setting_u64(SETTING_ALERT_AUTO_EXPIRE_MS, 10_000));
        self.push(
            client_id,
            target,
            PushEnvelope::alert("api", content, level, duration),
        )
    }

    /// Sends a `command:reload` to a target.
    pub fn reload(&self, client_id: &str, target: &str) -> SignageResult<PushOutcome> {
        self.send(
            client_id,
            target,
            ServerMessage::CommandReload {
                timestamp: now_millis(),
            },
        )
    }

    /// Sends a `command:clear` (remove content without reloading).
    pub fn clear(&self, client_id: &str, target: &str) -> SignageResult<PushOutcome> {
        self.send(
            client_id,
            target,
            ServerMessage::CommandClear {
                timestamp: now_millis(),
            },
        )
    }

    /// Sends a flash-id command, useful while arranging sync groups.
    pub fn identify(&self, client_id: &str, target: &str) -> SignageResult<PushOutcome> {
        self.send(
            client_id,
            target,
            ServerMessage::CommandIdentify {
                timestamp: now_millis(),
            },
        )
    }

    /// Requests screenshots; responses land in the screenshot cache.
    pub fn request_screenshot(&self, client_id: &str, target: &str) -> SignageResult<PushOutcome> {
        self.send(
            client_id,
            target,
            ServerMessage::CommandScreenshot {
                timestamp: now_millis(),
            },
        )
    }

    /// Forces a display mode on one screen. The screen reports the applied
    /// mode back via `screens:mode-update`.
    pub fn force_mode(&self, screen_id: &str, mode: ScreenMode) -> SignageResult<PushOutcome> {
        let delivered = self.registry.send_to(
            screen_id,
            ServerMessage::CommandMode {
                mode,
                timestamp: now_millis(),
            },
        );
        Ok(PushOutcome {
            dispatched: usize::from(delivered),
            matched: usize::from(delivered),
        })
    }

    /// Builds the standard playlist envelope used by both the API push
    /// and the schedule evaluator.
    pub fn playlist_envelope(source: &str, playlist: &crate::model::Playlist) -> PushEnvelope {
        PushEnvelope::new(
            source,
            PushKind::Playlist,
            json!({
                "playlistId": playlist.id,
                "name": playlist.name,
                "items": playlist.items,
                "loop": playlist.loop_enabled,
                "transition": playlist.transition,
            }),
        )
    }
}
