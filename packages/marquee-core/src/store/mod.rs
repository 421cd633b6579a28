//! Embedded relational store for the catalogue.
//!
//! A single SQLite connection behind a mutex. All access is synchronous
//! and short; long-running work (collector polls, timers, fan-out) never
//! holds the store lock. WAL mode keeps concurrent readers cheap and an
//! explicit transaction wraps every multi-statement write so a crash
//! mid-write leaves the previous data intact.

mod announcements;
mod clients;
mod locations;
mod playlists;
mod schedules;
pub mod schema;
mod screens;
mod settings;
mod stats;
mod sync_groups;

pub use screens::ScreenFilter;
pub use stats::DashboardStats;

#[cfg(test)]
pub(crate) use playlists::make_playlist;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::Value;

use crate::error::SignageResult;
use crate::model::BOOTSTRAP_TENANT;
use crate::utils::now_millis;

/// Settings key: default transition for new playlists.
pub const SETTING_DEFAULT_TRANSITION: &str = "default_transition";
/// Settings key: auto-dismiss delay applied to alerts without one (ms).
pub const SETTING_ALERT_AUTO_EXPIRE_MS: &str = "alert_auto_expire_ms";
/// Settings key: minutes without a heartbeat before a screen goes offline.
pub const SETTING_OFFLINE_THRESHOLD_MINUTES: &str = "offline_threshold_minutes";
/// Settings key: tenant branding defaults blob.
pub const SETTING_BRANDING_DEFAULTS: &str = "branding_defaults";

/// Handle to the embedded store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the store at `path` and applies the schema.
    pub fn open(path: &Path) -> SignageResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Opens an in-memory store. Used by tests and ephemeral deployments.
    pub fn open_in_memory() -> SignageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SignageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::create_tables(&conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![schema::SCHEMA_VERSION],
        )?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed()?;
        Ok(store)
    }

    /// Seeds the bootstrap tenant and default settings. Idempotent.
    fn seed(&self) -> SignageResult<()> {
        let conn = self.conn.lock();
        let now = now_millis();
        conn.execute(
            "INSERT OR IGNORE INTO clients (id, name, slug, branding, plan, active, created_at, updated_at)
             VALUES (?1, 'Parkwise', ?1, '{}', 'enterprise', 1, ?2, ?2)",
            rusqlite::params![BOOTSTRAP_TENANT, now],
        )?;
        for (key, value) in [
            (SETTING_DEFAULT_TRANSITION, "fade"),
            (SETTING_ALERT_AUTO_EXPIRE_MS, "10000"),
            (SETTING_OFFLINE_THRESHOLD_MINUTES, "10"),
            (
                SETTING_BRANDING_DEFAULTS,
                r##"{"primaryColor":"#1a73e8","secondaryColor":"#202124","accentColor":"#fbbc04","fontFamily":"Inter","theme":"dark"}"##,
            ),
        ] {
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )?;
        }
        Ok(())
    }

    /// Runs `f` with the locked connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> SignageResult<T>) -> SignageResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

/// Serializes a JSON column value, treating `Null` as an empty object.
pub(crate) fn json_to_column(value: &Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Deserializes a JSON column, falling back to the given default on garbage.
pub(crate) fn column_to_json(text: &str, default: Value) -> Value {
    serde_json::from_str(text).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_seeds_bootstrap_tenant() {
        let store = Store::open_in_memory().unwrap();
        let client = store.get_client(BOOTSTRAP_TENANT).unwrap();
        assert_eq!(client.slug, BOOTSTRAP_TENANT);
        assert!(client.active);
    }

    #[test]
    fn open_seeds_default_settings() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.get_setting(SETTING_ALERT_AUTO_EXPIRE_MS).unwrap(),
            Some("10000".to_string())
        );
        assert_eq!(
            store
                .get_setting(SETTING_OFFLINE_THRESHOLD_MINUTES)
                .unwrap(),
            Some("10".to_string())
        );
    }

    #[test]
    fn seed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        drop(Store::open(&path).unwrap());
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_clients().unwrap().len(), 1);
    }

    #[test]
    fn json_column_round_trip() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(
            column_to_json(&json_to_column(&value), Value::Null),
            value
        );
        assert_eq!(json_to_column(&Value::Null), "{}");
        assert_eq!(
            column_to_json("not json", serde_json::json!({})),
            serde_json::json!({})
        );
    }
}
