//! The typed message envelope carried by every screen-bound push.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::now_millis;

/// Payload kind of a push envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    Url,
    Media,
    Widget,
    Playlist,
    Alert,
    Clear,
    Mode,
    Reload,
}

/// Severity of an alert push. The player styles the banner by level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warn,
    Error,
}

/// Wrapper for all screen-bound content messages.
///
/// `source` tags the dispatching subsystem (`api`, `schedule`, `sync`,
/// `context`) so the player and the admin UI can attribute what they see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    /// Epoch milliseconds at dispatch.
    pub timestamp: u64,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: PushKind,
    /// Kind-specific payload, passed through opaquely.
    pub content: Value,
    /// Alert severity; only present on alert envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<AlertLevel>,
    /// Auto-dismiss delay in milliseconds; only present on alert envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl PushEnvelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(source: &str, kind: PushKind, content: Value) -> Self {
        Self {
            timestamp: now_millis(),
            source: source.to_string(),
            kind,
            content,
            level: None,
            duration: None,
        }
    }

    /// Creates an alert envelope with level and auto-dismiss duration.
    #[must_use]
    pub fn alert(source: &str, content: Value, level: AlertLevel, duration_ms: u64) -> Self {
        Self {
            timestamp: now_millis(),
            source: source.to_string(),
            kind: PushKind::Alert,
            content,
            level: Some(level),
            duration: Some(duration_ms),
        }
    }
}
