//! Persisted domain entities and their wire representations.
//!
//! Everything here serializes as camelCase JSON for the HTTP API and the
//! screen event channel. JSON blob columns (`branding`, `config`,
//! `capabilities`) round-trip as raw values so unknown keys survive a
//! read-modify-write cycle; playlist items are the one blob with an
//! enumerated legal shape and get a typed model.

mod envelope;

pub use envelope::{AlertLevel, PushEnvelope, PushKind};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SignageError, SignageResult};

/// The bootstrap tenant. Seeded at store open and protected from deletion.
pub const BOOTSTRAP_TENANT: &str = "parkwise";

// ─────────────────────────────────────────────────────────────────────────────
// Enums stored as TEXT columns
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(#[doc = $text] $variant,)+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl $name {
            /// Column representation.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parses the column representation, defaulting for unknown text.
            #[must_use]
            pub fn parse(text: &str) -> Self {
                match text {
                    $($text => Self::$variant,)+
                    _ => Self::$default,
                }
            }
        }
    };
}

text_enum! {
    /// Tenant subscription plan.
    Plan { Basic => "basic", Pro => "pro", Enterprise => "enterprise" }
    default Basic
}

text_enum! {
    /// Reachability as last observed by the registry sweep.
    ScreenStatus { Online => "online", Offline => "offline" }
    default Offline
}

text_enum! {
    /// Runtime display mode of a screen.
    ScreenMode { Signage => "signage", Interactive => "interactive" }
    default Signage
}

text_enum! {
    /// Coordination mode of a sync group.
    SyncMode { Mirror => "mirror", Complementary => "complementary", Span => "span" }
    default Mirror
}

text_enum! {
    /// Transition between playlist items.
    Transition { Fade => "fade", Slide => "slide", None => "none" }
    default Fade
}

text_enum! {
    /// Urgency of a notice-board announcement.
    AnnouncementPriority { Normal => "normal", High => "high", Urgent => "urgent" }
    default Normal
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenancy
// ─────────────────────────────────────────────────────────────────────────────

/// Tenant: the top-level isolation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    /// Unique, URL-safe identifier.
    pub slug: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Colour/font/theme blob. Known keys: primaryColor, secondaryColor,
    /// accentColor, fontFamily, theme. Unknown keys pass through unchanged.
    #[serde(default)]
    pub branding: Value,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Physical site owned by exactly one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// IANA timezone name, e.g. `Europe/London`.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Capacity, features, rates, rules, contact, operatingHours blob.
    #[serde(default)]
    pub config: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Screens
// ─────────────────────────────────────────────────────────────────────────────

/// Display endpoint. The id is the stable identifier the screen
/// self-reports on connect; registration upserts by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: String,
    pub client_id: String,
    pub name: String,
    /// Free-form grouping tag (distinct from sync groups).
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    /// Sync group membership; a screen belongs to at most one.
    #[serde(default)]
    pub sync_group: Option<String>,
    #[serde(default, rename = "type")]
    pub screen_type: Option<String>,
    #[serde(default)]
    pub status: ScreenStatus,
    /// Epoch milliseconds of the last heartbeat or registration.
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub orientation: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub config: Value,
    /// Runtime only: key present in the connected-screen map.
    #[serde(default)]
    pub connected: bool,
    /// Runtime only: current display mode, seeded to signage on connect.
    #[serde(default)]
    pub current_mode: ScreenMode,
}

// ─────────────────────────────────────────────────────────────────────────────
// Playlists
// ─────────────────────────────────────────────────────────────────────────────

/// Item duration bounds (seconds).
pub const ITEM_DURATION_MIN: u32 = 5;
/// Item duration bounds (seconds).
pub const ITEM_DURATION_MAX: u32 = 600;

/// Kind of content a playlist item renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Template,
    Widget,
    Url,
}

/// One entry in a playlist's ordered item list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub content_type: ContentType,
    /// Opaque payload id for video/template items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Widget name for widget items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    /// Opaque per-item configuration, passed through to the player.
    #[serde(default)]
    pub config: Value,
    /// Display duration in whole seconds.
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PlaylistItem {
    /// Validates the item against the legal shapes.
    pub fn validate(&self) -> SignageResult<()> {
        if !(ITEM_DURATION_MIN..=ITEM_DURATION_MAX).contains(&self.duration) {
            return Err(SignageError::InvalidInput(format!(
                "item duration {}s outside {}..{}s",
                self.duration, ITEM_DURATION_MIN, ITEM_DURATION_MAX
            )));
        }
        match self.content_type {
            ContentType::Url if self.url.is_none() => Err(SignageError::InvalidInput(
                "url item requires a url".to_string(),
            )),
            ContentType::Widget if self.widget.is_none() => Err(SignageError::InvalidInput(
                "widget item requires a widget name".to_string(),
            )),
            ContentType::Video | ContentType::Template if self.content_id.is_none() => {
                Err(SignageError::InvalidInput(format!(
                    "{:?} item requires a contentId",
                    self.content_type
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Ordered content sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(default = "default_true", rename = "loop")]
    pub loop_enabled: bool,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Playlist {
    /// Validates every item.
    pub fn validate(&self) -> SignageResult<()> {
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schedules
// ─────────────────────────────────────────────────────────────────────────────

/// Time-based playlist activation rule.
///
/// `screen_target` is the literal `"all"`, a screen id, or a group id, and
/// is resolved by the push bus at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub client_id: String,
    pub playlist_id: String,
    pub screen_target: String,
    /// `HH:MM`, 24-hour.
    pub start_time: String,
    /// `HH:MM`, 24-hour; must not precede `start_time` (overnight windows
    /// are unsupported by design).
    pub end_time: String,
    /// Weekdays the rule applies on, 0 = Sunday.
    pub days: Vec<u8>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Parses an `HH:MM` clock string into minutes since midnight.
pub fn parse_hhmm(text: &str) -> SignageResult<u32> {
    let (h, m) = text
        .split_once(':')
        .ok_or_else(|| SignageError::InvalidInput(format!("bad time {text:?}, expected HH:MM")))?;
    let hours: u32 = h
        .parse()
        .map_err(|_| SignageError::InvalidInput(format!("bad hour in {text:?}")))?;
    let minutes: u32 = m
        .parse()
        .map_err(|_| SignageError::InvalidInput(format!("bad minute in {text:?}")))?;
    if hours > 23 || minutes > 59 {
        return Err(SignageError::InvalidInput(format!(
            "time {text:?} out of range"
        )));
    }
    Ok(hours * 60 + minutes)
}

impl Schedule {
    /// Validates window, day set and time ordering.
    pub fn validate(&self) -> SignageResult<()> {
        let start = parse_hhmm(&self.start_time)?;
        let end = parse_hhmm(&self.end_time)?;
        if start > end {
            return Err(SignageError::InvalidInput(
                "startTime must not be after endTime (overnight windows unsupported)".to_string(),
            ));
        }
        if self.days.is_empty() || self.days.iter().any(|d| *d > 6) {
            return Err(SignageError::InvalidInput(
                "days must be a non-empty subset of 0..=6".to_string(),
            ));
        }
        if self.screen_target.is_empty() {
            return Err(SignageError::InvalidInput(
                "screenTarget is required".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync groups, announcements, settings
// ─────────────────────────────────────────────────────────────────────────────

/// Set of screens meant to play in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroup {
    pub id: String,
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default)]
    pub playlist_id: Option<String>,
    /// Advisory; playback timing is driven server-side.
    #[serde(default)]
    pub leader_screen_id: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Notice-board entry, optionally scoped to a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub client_id: String,
    /// `None` means global across the tenant.
    #[serde(default)]
    pub location_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub priority: AnnouncementPriority,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Process-wide key/value setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_enums_round_trip_columns() {
        assert_eq!(Plan::parse("enterprise"), Plan::Enterprise);
        assert_eq!(SyncMode::Span.as_str(), "span");
        assert_eq!(SyncMode::parse("nonsense"), SyncMode::Mirror);
        assert_eq!(ScreenMode::parse("interactive"), ScreenMode::Interactive);
    }

    #[test]
    fn playlist_item_duration_bounds() {
        let mut item = PlaylistItem {
            content_type: ContentType::Url,
            content_id: None,
            url: Some("https://example.com".into()),
            widget: None,
            config: Value::Null,
            duration: 4,
            name: None,
        };
        assert!(item.validate().is_err());
        item.duration = 5;
        assert!(item.validate().is_ok());
        item.duration = 601;
        assert!(item.validate().is_err());
    }

    #[test]
    fn playlist_item_shape_checks() {
        let widget = PlaylistItem {
            content_type: ContentType::Widget,
            content_id: None,
            url: None,
            widget: None,
            config: Value::Null,
            duration: 10,
            name: None,
        };
        assert!(widget.validate().is_err());

        let video = PlaylistItem {
            content_type: ContentType::Video,
            content_id: Some("promo.mp4".into()),
            url: None,
            widget: None,
            config: Value::Null,
            duration: 30,
            name: Some("Promo".into()),
        };
        assert!(video.validate().is_ok());
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("00:00").unwrap(), 0);
        assert_eq!(parse_hhmm("09:30").unwrap(), 570);
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("12:60").is_err());
        assert!(parse_hhmm("noon").is_err());
    }

    #[test]
    fn overnight_schedule_rejected() {
        let schedule = Schedule {
            id: "s1".into(),
            client_id: "parkwise".into(),
            playlist_id: "p1".into(),
            screen_target: "all".into(),
            start_time: "22:00".into(),
            end_time: "06:00".into(),
            days: vec![1, 2, 3],
            priority: 0,
            enabled: true,
            created_at: 0,
            updated_at: 0,
        };
        let err = schedule.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn schedule_day_set_bounds() {
        let mut schedule = Schedule {
            id: "s1".into(),
            client_id: "parkwise".into(),
            playlist_id: "p1".into(),
            screen_target: "all".into(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            days: vec![7],
            priority: 0,
            enabled: true,
            created_at: 0,
            updated_at: 0,
        };
        assert!(schedule.validate().is_err());
        schedule.days = vec![0, 6];
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn screen_serializes_camel_case() {
        let screen = Screen {
            id: "scr-1".into(),
            client_id: "parkwise".into(),
            name: "Lobby".into(),
            group_id: Some("entrance".into()),
            location_id: None,
            sync_group: None,
            screen_type: None,
            status: ScreenStatus::Online,
            last_seen: 123,
            platform: None,
            resolution: None,
            orientation: None,
            capabilities: json!({}),
            config: json!({}),
            connected: true,
            current_mode: ScreenMode::Signage,
        };
        let value = serde_json::to_value(&screen).unwrap();
        assert_eq!(value["clientId"], "parkwise");
        assert_eq!(value["groupId"], "entrance");
        assert_eq!(value["lastSeen"], 123);
        assert_eq!(value["currentMode"], "signage");
    }

    #[test]
    fn unknown_branding_keys_survive() {
        let raw = json!({"primaryColor": "#123456", "futureKey": [1, 2, 3]});
        let client: Client = serde_json::from_value(json!({
            "id": "c1",
            "name": "Acme",
            "slug": "acme",
            "branding": raw.clone(),
        }))
        .unwrap();
        assert_eq!(client.branding, raw);
    }
}
