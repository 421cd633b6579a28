//! Sync group persistence. Membership lives on the screens table
//! (`sync_group`/`sync_position`); this module owns the group rows.

use rusqlite::{params, Row};
use serde_json::json;

use crate::error::{SignageError, SignageResult};
use crate::model::{SyncGroup, SyncMode};
use crate::utils::now_millis;

use super::{column_to_json, json_to_column, Store};

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<SyncGroup> {
    Ok(SyncGroup {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        mode: SyncMode::parse(&row.get::<_, String>(3)?),
        playlist_id: row.get(4)?,
        leader_screen_id: row.get(5)?,
        config: column_to_json(&row.get::<_, String>(6)?, json!({})),
        created_at: row.get::<_, i64>(7)? as u64,
        updated_at: row.get::<_, i64>(8)? as u64,
    })
}

const GROUP_COLUMNS: &str =
    "id, client_id, name, mode, playlist_id, leader_screen_id, config, created_at, updated_at";

impl Store {
    /// Inserts a sync group.
    pub fn insert_sync_group(&self, group: &SyncGroup) -> SignageResult<SyncGroup> {
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_groups (id, client_id, name, mode, playlist_id, leader_screen_id, config, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    group.id,
                    group.client_id,
                    group.name,
                    group.mode.as_str(),
                    group.playlist_id,
                    group.leader_screen_id,
                    json_to_column(&group.config),
                    now as i64,
                ],
            )?;
            Ok(())
        })?;
        self.get_sync_group(&group.id)
    }

    /// Fetches a sync group by id.
    pub fn get_sync_group(&self, id: &str) -> SignageResult<SyncGroup> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM sync_groups WHERE id = ?1"),
                params![id],
                row_to_group,
            )
            .map_err(|_| SignageError::NotFound(format!("sync group {id}")))
        })
    }

    /// Lists sync groups, optionally scoped to one tenant.
    pub fn list_sync_groups(&self, client_id: Option<&str>) -> SignageResult<Vec<SyncGroup>> {
        self.with_conn(|conn| {
            let rows = match client_id {
                Some(client) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {GROUP_COLUMNS} FROM sync_groups WHERE client_id = ?1 ORDER BY name"
                    ))?;
                    let rows = stmt.query_map(params![client], row_to_group)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {GROUP_COLUMNS} FROM sync_groups ORDER BY name"
                    ))?;
                    let rows = stmt.query_map([], row_to_group)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Updates a sync group.
    pub fn update_sync_group(&self, id: &str, patch: &SyncGroup) -> SignageResult<SyncGroup> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE sync_groups SET name = ?2, mode = ?3, playlist_id = ?4,
                        leader_screen_id = ?5, config = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.mode.as_str(),
                    patch.playlist_id,
                    patch.leader_screen_id,
                    json_to_column(&patch.config),
                    now_millis() as i64,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("sync group {id}")));
        }
        self.get_sync_group(id)
    }

    /// Deletes a sync group row. Callers must stop playback and unassign
    /// members first; the sync engine wraps this.
    pub fn delete_sync_group(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM sync_groups WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("sync group {id}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BOOTSTRAP_TENANT;
    use serde_json::Value;

    pub(crate) fn make_group(id: &str, mode: SyncMode) -> SyncGroup {
        SyncGroup {
            id: id.into(),
            client_id: BOOTSTRAP_TENANT.into(),
            name: format!("Group {id}"),
            mode,
            playlist_id: None,
            leader_screen_id: None,
            config: Value::Null,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn crud_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_sync_group(&make_group("g1", SyncMode::Mirror))
            .unwrap();

        let mut loaded = store.get_sync_group("g1").unwrap();
        assert_eq!(loaded.mode, SyncMode::Mirror);

        loaded.mode = SyncMode::Span;
        loaded.playlist_id = Some("p1".into());
        store.update_sync_group("g1", &loaded).unwrap();
        let reloaded = store.get_sync_group("g1").unwrap();
        assert_eq!(reloaded.mode, SyncMode::Span);
        assert_eq!(reloaded.playlist_id.as_deref(), Some("p1"));

        store.delete_sync_group("g1").unwrap();
        assert!(store.get_sync_group("g1").is_err());
    }

    #[test]
    fn list_scopes_by_tenant() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_sync_group(&make_group("g1", SyncMode::Complementary))
            .unwrap();
        assert_eq!(
            store.list_sync_groups(Some(BOOTSTRAP_TENANT)).unwrap().len(),
            1
        );
        assert!(store.list_sync_groups(Some("ghost")).unwrap().is_empty());
    }
}
