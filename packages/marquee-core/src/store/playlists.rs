//! Playlist persistence. Items are stored as a JSON column but always
//! pass through the typed [`PlaylistItem`] model on the way in.

use rusqlite::{params, Row};

use crate::error::{SignageError, SignageResult};
use crate::model::{Playlist, PlaylistItem, Transition};
use crate::utils::now_millis;

use super::Store;

fn row_to_playlist(row: &Row<'_>) -> rusqlite::Result<Playlist> {
    let items_text: String = row.get(4)?;
    let items: Vec<PlaylistItem> = serde_json::from_str(&items_text).unwrap_or_default();
    Ok(Playlist {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        items,
        loop_enabled: row.get::<_, i64>(5)? != 0,
        transition: Transition::parse(&row.get::<_, String>(6)?),
        created_at: row.get::<_, i64>(7)? as u64,
        updated_at: row.get::<_, i64>(8)? as u64,
    })
}

const PLAYLIST_COLUMNS: &str =
    "id, client_id, name, description, items, loop_enabled, transition, created_at, updated_at";

impl Store {
    /// Inserts a playlist after validating its items.
    pub fn insert_playlist(&self, playlist: &Playlist) -> SignageResult<Playlist> {
        playlist.validate()?;
        let items = serde_json::to_string(&playlist.items)?;
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO playlists (id, client_id, name, description, items, loop_enabled, transition, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    playlist.id,
                    playlist.client_id,
                    playlist.name,
                    playlist.description,
                    items,
                    playlist.loop_enabled as i64,
                    playlist.transition.as_str(),
                    now as i64,
                ],
            )?;
            Ok(())
        })?;
        self.get_playlist(&playlist.id)
    }

    /// Fetches a playlist by id.
    pub fn get_playlist(&self, id: &str) -> SignageResult<Playlist> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = ?1"),
                params![id],
                row_to_playlist,
            )
            .map_err(|_| SignageError::NotFound(format!("playlist {id}")))
        })
    }

    /// Lists playlists, optionally scoped to one tenant.
    pub fn list_playlists(&self, client_id: Option<&str>) -> SignageResult<Vec<Playlist>> {
        self.with_conn(|conn| {
            let rows = match client_id {
                Some(client) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE client_id = ?1 ORDER BY name"
                    ))?;
                    let rows = stmt.query_map(params![client], row_to_playlist)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {PLAYLIST_COLUMNS} FROM playlists ORDER BY name"
                    ))?;
                    let rows = stmt.query_map([], row_to_playlist)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Updates a playlist after validating the replacement items.
    pub fn update_playlist(&self, id: &str, patch: &Playlist) -> SignageResult<Playlist> {
        patch.validate()?;
        let items = serde_json::to_string(&patch.items)?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE playlists SET name = ?2, description = ?3, items = ?4,
                        loop_enabled = ?5, transition = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.description,
                    items,
                    patch.loop_enabled as i64,
                    patch.transition.as_str(),
                    now_millis() as i64,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("playlist {id}")));
        }
        self.get_playlist(id)
    }

    /// Deletes a playlist; schedules referencing it cascade away.
    pub fn delete_playlist(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM playlists WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("playlist {id}")));
            }
            Ok(())
        })
    }
}

/// Builds a widget-item playlist for tests across the crate.
#[cfg(test)]
pub(crate) fn make_playlist(id: &str, durations: &[u32]) -> Playlist {
    use crate::model::{ContentType, BOOTSTRAP_TENANT};
    use serde_json::Value;

    Playlist {
        id: id.into(),
        client_id: BOOTSTRAP_TENANT.into(),
        name: format!("Playlist {id}"),
        description: None,
        items: durations
            .iter()
            .enumerate()
            .map(|(i, d)| PlaylistItem {
                content_type: ContentType::Widget,
                content_id: None,
                url: None,
                widget: Some(format!("widget-{i}")),
                config: Value::Null,
                duration: *d,
                name: None,
            })
            .collect(),
        loop_enabled: true,
        transition: Transition::Fade,
        created_at: 0,
        updated_at: 0,
    }
}
