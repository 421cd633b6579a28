//! Process-wide key/value settings.

use std::collections::BTreeMap;

use rusqlite::params;

use crate::error::SignageResult;

use super::Store;

impl Store {
    /// Reads one setting.
    pub fn get_setting(&self, key: &str) -> SignageResult<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .ok())
        })
    }

    /// Reads a numeric setting, falling back when missing or unparseable.
    pub fn get_setting_u64(&self, key: &str, default: u64) -> u64 {
        self.get_setting(key)
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Upserts one setting.
    pub fn set_setting(&self, key: &str, value: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Returns every setting, sorted by key.
    pub fn all_settings(&self) -> SignageResult<BTreeMap<String, String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
        })
    }
}
