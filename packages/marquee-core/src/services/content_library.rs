//! Static content catalogue: widgets, templates and the video library.
//!
//! Widgets and templates are opaque payload ids with display metadata; the
//! video library is a directory the server only lists and streams.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::error::{SignageError, SignageResult};
use crate::utils::safe_filename;

/// One entry of the widget or template catalogue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Default configuration the admin UI offers for the entry.
    pub default_config: serde_json::Value,
}

/// Built-in widgets the player can render.
pub fn widgets() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            id: "clock",
            name: "Clock",
            description: "Local time with date",
            default_config: json!({"format": "24h", "showDate": true}),
        },
        CatalogEntry {
            id: "weather",
            name: "Weather",
            description: "Current conditions for the screen's location",
            default_config: json!({"units": "metric"}),
        },
        CatalogEntry {
            id: "announcements",
            name: "Announcements",
            description: "Rotating notice board entries",
            default_config: json!({"rotateSecs": 8}),
        },
        CatalogEntry {
            id: "occupancy",
            name: "Occupancy",
            description: "Live space availability",
            default_config: json!({"showTrend": true}),
        },
        CatalogEntry {
            id: "rates",
            name: "Rates",
            description: "Tariff table from the location config",
            default_config: json!({}),
        },
    ]
}

/// Built-in full-screen templates.
pub fn templates() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            id: "welcome",
            name: "Welcome",
            description: "Branded welcome board",
            default_config: json!({"headline": "Welcome"}),
        },
        CatalogEntry {
            id: "wayfinding",
            name: "Wayfinding",
            description: "Directional arrows and level indicators",
            default_config: json!({"arrow": "up"}),
        },
        CatalogEntry {
            id: "info-board",
            name: "Info Board",
            description: "Mixed widgets over branding",
            default_config: json!({"panels": ["clock", "weather", "announcements"]}),
        },
    ]
}

/// Video library backed by a directory the server only reads.
pub struct VideoLibrary {
    dir: Option<PathBuf>,
}

/// Extensions listed by the catalogue.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];

impl VideoLibrary {
    /// Creates a library over an optional directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Lists the video files currently in the directory.
    pub async fn list(&self) -> SignageResult<Vec<String>> {
        let Some(ref dir) = self.dir else {
            return Ok(Vec::new());
        };
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("[Content] video dir unreadable: {e}");
                return Ok(Vec::new());
            }
        };
        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_video = Path::new(&name)
                        .extension()
                        .map(|ext| {
                            VIDEO_EXTENSIONS
                                .iter()
                                .any(|v| ext.eq_ignore_ascii_case(v))
                        })
                        .unwrap_or(false);
                    if is_video && safe_filename(&name) {
                        names.push(name);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[Content] video dir read error: {e}");
                    break;
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolves a requested filename to a path inside the directory.
    ///
    /// Rejects names that could escape the directory.
    pub fn resolve(&self, filename: &str) -> SignageResult<PathBuf> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| SignageError::NotFound("video library not configured".into()))?;
        if !safe_filename(filename) {
            return Err(SignageError::InvalidInput(format!(
                "invalid filename {filename:?}"
            )));
        }
        let path = dir.join(filename);
        if !path.is_file() {
            return Err(SignageError::NotFound(format!("video {filename}")));
        }
        Ok(path)
    }

    /// Content type for a video filename.
    pub fn content_type(filename: &str) -> &'static str {
        match Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("mp4") => "video/mp4",
            Some("webm") => "video/webm",
            Some("mov") => "video/quicktime",
            Some("mkv") => "video/x-matroska",
            _ => "application/octet-stream",
        }
    }
}
