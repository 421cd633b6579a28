//! Screen persistence, including sync-group membership bookkeeping.

use rusqlite::{params, Row};
use serde_json::json;

use crate::error::{SignageError, SignageResult};
use crate::model::{Screen, ScreenStatus};

use super::{column_to_json, json_to_column, Store};

fn row_to_screen(row: &Row<'_>) -> rusqlite::Result<Screen> {
    Ok(Screen {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        group_id: row.get(3)?,
        location_id: row.get(4)?,
        sync_group: row.get(5)?,
        screen_type: row.get(6)?,
        status: ScreenStatus::parse(&row.get::<_, String>(7)?),
        last_seen: row.get::<_, i64>(8)? as u64,
        platform: row.get(9)?,
        resolution: row.get(10)?,
        orientation: row.get(11)?,
        capabilities: column_to_json(&row.get::<_, String>(12)?, json!({})),
        config: column_to_json(&row.get::<_, String>(13)?, json!({})),
        connected: false,
        current_mode: Default::default(),
    })
}

const SCREEN_COLUMNS: &str = "id, client_id, name, group_id, location_id, sync_group, type, \
                              status, last_seen, platform, resolution, orientation, capabilities, config";

/// Filter for screen listings.
#[derive(Debug, Default, Clone)]
pub struct ScreenFilter<'a> {
    pub client_id: Option<&'a str>,
    pub location_id: Option<&'a str>,
    pub status: Option<ScreenStatus>,
}

impl Store {
    /// Inserts or updates a screen row by its self-reported id.
    ///
    /// Registration is idempotent: an existing row keeps its membership
    /// fields unless the registration supplies replacements.
    pub fn upsert_screen(&self, screen: &Screen) -> SignageResult<Screen> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO screens (id, client_id, name, group_id, location_id, sync_group, type,
                                      status, last_seen, platform, resolution, orientation, capabilities, config)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     group_id = COALESCE(excluded.group_id, screens.group_id),
                     location_id = COALESCE(excluded.location_id, screens.location_id),
                     type = COALESCE(excluded.type, screens.type),
                     status = excluded.status,
                     last_seen = excluded.last_seen,
                     platform = COALESCE(excluded.platform, screens.platform),
                     resolution = COALESCE(excluded.resolution, screens.resolution),
                     orientation = COALESCE(excluded.orientation, screens.orientation),
                     capabilities = excluded.capabilities",
                params![
                    screen.id,
                    screen.client_id,
                    screen.name,
                    screen.group_id,
                    screen.location_id,
                    screen.sync_group,
                    screen.screen_type,
                    screen.status.as_str(),
                    screen.last_seen as i64,
                    screen.platform,
                    screen.resolution,
                    screen.orientation,
                    json_to_column(&screen.capabilities),
                    json_to_column(&screen.config),
                ],
            )?;
            Ok(())
        })?;
        self.get_screen(&screen.id)
    }

    /// Fetches a screen by id.
    pub fn get_screen(&self, id: &str) -> SignageResult<Screen> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SCREEN_COLUMNS} FROM screens WHERE id = ?1"),
                params![id],
                row_to_screen,
            )
            .map_err(|_| SignageError::NotFound(format!("screen {id}")))
        })
    }

    /// Lists screens matching the filter.
    pub fn list_screens(&self, filter: &ScreenFilter<'_>) -> SignageResult<Vec<Screen>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {SCREEN_COLUMNS} FROM screens WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(client) = filter.client_id {
                sql.push_str(&format!(" AND client_id = ?{}", args.len() + 1));
                args.push(Box::new(client.to_string()));
            }
            if let Some(location) = filter.location_id {
                sql.push_str(&format!(" AND location_id = ?{}", args.len() + 1));
                args.push(Box::new(location.to_string()));
            }
            if let Some(status) = filter.status {
                sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
                args.push(Box::new(status.as_str().to_string()));
            }
            sql.push_str(" ORDER BY name");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                row_to_screen,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Updates admin-mutable screen fields.
    pub fn update_screen(&self, id: &str, patch: &Screen) -> SignageResult<Screen> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE screens SET name = ?2, group_id = ?3, location_id = ?4, type = ?5, config = ?6
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.group_id,
                    patch.location_id,
                    patch.screen_type,
                    json_to_column(&patch.config),
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("screen {id}")));
        }
        self.get_screen(id)
    }

    /// Deletes a screen row.
    pub fn delete_screen(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM screens WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("screen {id}")));
            }
            Ok(())
        })
    }

    /// Stamps reachability and last-seen for one screen.
    pub fn set_screen_status(
        &self,
        id: &str,
        status: ScreenStatus,
        last_seen: u64,
    ) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE screens SET status = ?2, last_seen = ?3 WHERE id = ?1",
                params![id, status.as_str(), last_seen as i64],
            )?;
            Ok(())
        })
    }

    /// Flips a screen offline without disturbing its `last_seen`, so the
    /// admin UI still shows when it was last heard from.
    pub fn mark_screen_offline(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE screens SET status = 'offline' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    /// Heartbeat: refreshes `last_seen` without touching status.
    pub fn touch_screen(&self, id: &str, last_seen: u64) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE screens SET last_seen = ?2 WHERE id = ?1",
                params![id, last_seen as i64],
            )?;
            Ok(())
        })
    }

    /// Marks every screen offline. Run at boot, before any channel exists.
    pub fn set_all_screens_offline(&self) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE screens SET status = 'offline'", [])?;
            Ok(())
        })
    }

    /// Screens whose status is online but whose last heartbeat predates
    /// `cutoff_ms`. These are flipped offline by the registry sweep.
    pub fn stale_online_screens(&self, cutoff_ms: u64) -> SignageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM screens WHERE status = 'online' AND last_seen < ?1",
            )?;
            let rows = stmt.query_map(params![cutoff_ms as i64], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Target resolution helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Screen ids of one tenant carrying the tag as `group_id` or `sync_group`.
    pub fn screen_ids_by_group_tag(&self, client_id: &str, tag: &str) -> SignageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM screens
                 WHERE client_id = ?1 AND (group_id = ?2 OR sync_group = ?2)
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![client_id, tag], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Screen ids of one tenant at a location.
    pub fn screen_ids_by_location(&self, client_id: &str, location_id: &str) -> SignageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM screens WHERE client_id = ?1 AND location_id = ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![client_id, location_id], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// All screen ids of one tenant.
    pub fn screen_ids_by_client(&self, client_id: &str) -> SignageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM screens WHERE client_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![client_id], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync-group membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Attaches screens to a sync group, appending to the member order.
    ///
    /// A screen may belong to at most one group; attaching moves it.
    pub fn attach_screens_to_group(&self, group_id: &str, screen_ids: &[String]) -> SignageResult<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for id in screen_ids {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(sync_position), -1) + 1 FROM screens WHERE sync_group = ?1",
                    params![group_id],
                    |row| row.get(0),
                )?;
                let changed = tx.execute(
                    "UPDATE screens SET sync_group = ?2, sync_position = ?3 WHERE id = ?1",
                    params![id, group_id, next],
                )?;
                if changed == 0 {
                    return Err(SignageError::NotFound(format!("screen {id}")));
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Detaches one screen from its sync group.
    pub fn detach_screen_from_group(&self, screen_id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE screens SET sync_group = NULL, sync_position = NULL WHERE id = ?1",
                params![screen_id],
            )?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("screen {screen_id}")));
            }
            Ok(())
        })
    }

    /// Unassigns every member of a group (group deletion).
    pub fn clear_sync_group_members(&self, group_id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE screens SET sync_group = NULL, sync_position = NULL WHERE sync_group = ?1",
                params![group_id],
            )?;
            Ok(())
        })
    }

    /// Member ids of a sync group in their deterministic order
    /// `(sync_position, id)`.
    pub fn sync_group_members(&self, group_id: &str) -> SignageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM screens WHERE sync_group = ?1 ORDER BY sync_position, id",
            )?;
            let rows = stmt.query_map(params![group_id], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}
