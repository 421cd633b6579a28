//! Denormalised counts for the dashboard endpoint.

use rusqlite::params;
use serde::Serialize;

use crate::error::SignageResult;

use super::Store;

/// Per-tenant counts surfaced by `/api/dashboard/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub screens_total: u32,
    pub screens_online: u32,
    pub locations: u32,
    pub playlists: u32,
    pub schedules_total: u32,
    pub schedules_enabled: u32,
    pub sync_groups: u32,
    pub announcements_active: u32,
}

impl Store {
    /// Computes the dashboard counts for one tenant.
    pub fn dashboard_stats(&self, client_id: &str) -> SignageResult<DashboardStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> rusqlite::Result<u32> {
                conn.query_row(sql, params![client_id], |row| row.get(0))
            };
            Ok(DashboardStats {
                screens_total: count("SELECT COUNT(*) FROM screens WHERE client_id = ?1")?,
                screens_online: count(
                    "SELECT COUNT(*) FROM screens WHERE client_id = ?1 AND status = 'online'",
                )?,
                locations: count("SELECT COUNT(*) FROM locations WHERE client_id = ?1")?,
                playlists: count("SELECT COUNT(*) FROM playlists WHERE client_id = ?1")?,
                schedules_total: count("SELECT COUNT(*) FROM schedules WHERE client_id = ?1")?,
                schedules_enabled: count(
                    "SELECT COUNT(*) FROM schedules WHERE client_id = ?1 AND enabled = 1",
                )?,
                sync_groups: count("SELECT COUNT(*) FROM sync_groups WHERE client_id = ?1")?,
                announcements_active: count(
                    "SELECT COUNT(*) FROM announcements WHERE client_id = ?1 AND active = 1",
                )?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScreenStatus, BOOTSTRAP_TENANT};
    use crate::store::ScreenFilter;

    #[test]
    fn counts_reflect_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_playlist(&crate::store::make_playlist("p1", &[10]))
            .unwrap();

        let stats = store.dashboard_stats(BOOTSTRAP_TENANT).unwrap();
        assert_eq!(stats.playlists, 1);
        assert_eq!(stats.screens_total, 0);
        assert_eq!(stats.screens_online, 0);

        // Sanity: the screen filter and the stats agree on emptiness.
        assert!(store
            .list_screens(&ScreenFilter {
                client_id: Some(BOOTSTRAP_TENANT),
                status: Some(ScreenStatus::Online),
                ..Default::default()
            })
            .unwrap()
            .is_empty());
    }
}
