//! Typed messages for the screen event channel and the internal event seam.
//!
//! This module provides:
//! - [`ServerMessage`]: everything the server sends down a screen channel
//! - [`ClientMessage`]: everything a screen sends up
//! - [`EventEmitter`] trait for domain services to surface registry and
//!   playback events without knowledge of transport
//!
//! The actual transport (WebSocket today; the seam permits SSE or gRPC
//! streams) is handled in the `api` module.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{PushEnvelope, ScreenMode, SyncMode};
use crate::services::context::MoodVector;

// ─────────────────────────────────────────────────────────────────────────────
// Server → Screen
// ─────────────────────────────────────────────────────────────────────────────

/// Messages pushed down a screen's event channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Content dispatch carrying a push envelope.
    #[serde(rename = "content")]
    Content { envelope: PushEnvelope },

    /// Lockstep advance for a sync group.
    #[serde(rename = "sync:tick")]
    SyncTick {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "itemIndex")]
        item_index: usize,
        timestamp: u64,
        /// Seconds until the next advance.
        duration: u32,
    },

    /// Manual reposition of a playing sync group.
    #[serde(rename = "sync:seek")]
    SyncSeek {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "itemIndex")]
        item_index: usize,
        timestamp: u64,
    },

    /// Catch-up snapshot for a screen joining a group mid-run.
    #[serde(rename = "sync:state")]
    SyncState {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "itemIndex")]
        item_index: usize,
        #[serde(rename = "startedAt")]
        started_at: u64,
        mode: SyncMode,
        #[serde(rename = "screenIndex")]
        screen_index: usize,
        #[serde(rename = "totalScreens")]
        total_screens: usize,
        playing: bool,
    },

    /// Full player reload.
    #[serde(rename = "command:reload")]
    CommandReload { timestamp: u64 },

    /// Remove current content without reloading.
    #[serde(rename = "command:clear")]
    CommandClear { timestamp: u64 },

    /// Flash the screen id on screen (sync group setup aid).
    #[serde(rename = "command:identify")]
    CommandIdentify { timestamp: u64 },

    /// Request a screenshot; the screen answers with `screenshot:response`.
    #[serde(rename = "command:screenshot")]
    CommandScreenshot { timestamp: u64 },

    /// Force the display mode.
    #[serde(rename = "command:mode")]
    CommandMode { mode: ScreenMode, timestamp: u64 },

    /// Ambient mood frame; screens filter by their location id.
    #[serde(rename = "context:mood")]
    ContextMood {
        #[serde(rename = "locationId")]
        location_id: String,
        mood: MoodVector,
        signals: Value,
        timestamp: u64,
    },

    /// Registry changed (connect, disconnect, membership); admin listeners
    /// refresh their screen lists on this.
    #[serde(rename = "screens:update")]
    ScreensUpdate { timestamp: u64 },

    /// A screen's display mode changed (screen-reported, server-accepted).
    #[serde(rename = "screens:mode-update")]
    ScreensModeUpdate {
        #[serde(rename = "screenId")]
        screen_id: String,
        mode: ScreenMode,
        timestamp: u64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Screen → Server
// ─────────────────────────────────────────────────────────────────────────────

/// Messages a screen sends up its event channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Self-registration on connect. Upserts the screen row by id.
    #[serde(rename = "player:register")]
    PlayerRegister {
        #[serde(rename = "screenId")]
        screen_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "groupId")]
        group_id: Option<String>,
        #[serde(default, rename = "locationId")]
        location_id: Option<String>,
        #[serde(default, rename = "clientId")]
        client_id: Option<String>,
        #[serde(default)]
        platform: Option<String>,
        #[serde(default)]
        resolution: Option<String>,
        #[serde(default)]
        orientation: Option<String>,
        #[serde(default)]
        capabilities: Value,
    },

    /// Periodic liveness report.
    #[serde(rename = "player:heartbeat")]
    PlayerHeartbeat {
        #[serde(rename = "screenId")]
        screen_id: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default, rename = "currentItem")]
        current_item: Option<Value>,
        #[serde(default, rename = "bufferHealth")]
        buffer_health: Option<f64>,
        /// Optional captured frame (base64); replaces the screenshot slot.
        #[serde(default)]
        screenshot: Option<String>,
    },

    /// Player finished booting and can accept content.
    #[serde(rename = "player:ready")]
    PlayerReady {
        #[serde(rename = "screenId")]
        screen_id: String,
        #[serde(default, rename = "groupId")]
        group_id: Option<String>,
    },

    /// Acknowledgement of a sync tick.
    #[serde(rename = "sync:ack")]
    SyncAck {
        #[serde(rename = "screenId")]
        screen_id: String,
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "itemIndex")]
        item_index: usize,
    },

    /// Answer to `command:screenshot`.
    #[serde(rename = "screenshot:response")]
    ScreenshotResponse {
        #[serde(rename = "screenId")]
        screen_id: String,
        /// Base64-encoded image bytes.
        image: String,
    },

    /// The screen applied a mode change (after `command:mode` or local input).
    #[serde(rename = "screens:mode-update")]
    ModeUpdate {
        #[serde(rename = "screenId")]
        screen_id: String,
        mode: ScreenMode,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain events (internal seam)
// ─────────────────────────────────────────────────────────────────────────────

/// Registry lifecycle events for embedders and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// A screen connected and registered.
    ScreenConnected { screen_id: String, timestamp: u64 },
    /// A screen disconnected or was swept offline.
    ScreenOffline { screen_id: String, timestamp: u64 },
    /// Catalogue rows changed (CRUD, membership moves).
    CatalogChanged { timestamp: u64 },
}

/// Sync engine lifecycle events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A group started playing a playlist.
    Started {
        group_id: String,
        playlist_id: String,
        timestamp: u64,
    },
    /// A group advanced to a new item.
    Advanced {
        group_id: String,
        item_index: usize,
        timestamp: u64,
    },
    /// A group stopped (explicit stop or group deletion).
    Stopped { group_id: String, timestamp: u64 },
}

/// Schedule evaluator decisions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScheduleEvent {
    /// A playlist was applied to a target.
    Applied {
        target: String,
        playlist_id: String,
        timestamp: u64,
    },
    /// A previously applied target was cleared.
    Cleared { target: String, timestamp: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_message_tags() {
        let msg = ServerMessage::SyncTick {
            group_id: "g1".into(),
            item_index: 2,
            timestamp: 99,
            duration: 10,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "sync:tick");
        assert_eq!(value["groupId"], "g1");
        assert_eq!(value["itemIndex"], 2);
    }

    #[test]
    fn client_register_parses() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "player:register",
            "screenId": "scr-1",
            "platform": "web",
            "capabilities": {"video": true},
        }))
        .unwrap();
        match msg {
            ClientMessage::PlayerRegister {
                screen_id,
                platform,
                ..
            } => {
                assert_eq!(screen_id, "scr-1");
                assert_eq!(platform.as_deref(), Some("web"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_optional_fields_default() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "player:heartbeat",
            "screenId": "scr-1",
        }))
        .unwrap();
        match msg {
            ClientMessage::PlayerHeartbeat {
                status, screenshot, ..
            } => {
                assert!(status.is_none());
                assert!(screenshot.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
