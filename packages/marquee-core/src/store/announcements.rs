//! Announcement persistence.

use rusqlite::{params, Row};

use crate::error::{SignageError, SignageResult};
use crate::model::{Announcement, AnnouncementPriority};
use crate::utils::now_millis;

use super::Store;

fn row_to_announcement(row: &Row<'_>) -> rusqlite::Result<Announcement> {
    Ok(Announcement {
        id: row.get(0)?,
        client_id: row.get(1)?,
        location_id: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        icon: row.get(5)?,
        priority: AnnouncementPriority::parse(&row.get::<_, String>(6)?),
        active: row.get::<_, i64>(7)? != 0,
        created_at: row.get::<_, i64>(8)? as u64,
        updated_at: row.get::<_, i64>(9)? as u64,
    })
}

const ANNOUNCEMENT_COLUMNS: &str =
    "id, client_id, location_id, title, message, icon, priority, active, created_at, updated_at";

impl Store {
    /// Inserts an announcement.
    pub fn insert_announcement(&self, a: &Announcement) -> SignageResult<Announcement> {
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO announcements (id, client_id, location_id, title, message, icon, priority, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    a.id,
                    a.client_id,
                    a.location_id,
                    a.title,
                    a.message,
                    a.icon,
                    a.priority.as_str(),
                    a.active as i64,
                    now as i64,
                ],
            )?;
            Ok(())
        })?;
        self.get_announcement(&a.id)
    }

    /// Fetches an announcement by id.
    pub fn get_announcement(&self, id: &str) -> SignageResult<Announcement> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE id = ?1"),
                params![id],
                row_to_announcement,
            )
            .map_err(|_| SignageError::NotFound(format!("announcement {id}")))
        })
    }

    /// Lists announcements, optionally scoped to one tenant. Urgent first,
    /// then newest.
    pub fn list_announcements(&self, client_id: Option<&str>) -> SignageResult<Vec<Announcement>> {
        self.with_conn(|conn| {
            let order = "ORDER BY CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 ELSE 2 END, created_at DESC";
            let rows = match client_id {
                Some(client) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE client_id = ?1 {order}"
                    ))?;
                    let rows = stmt.query_map(params![client], row_to_announcement)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements {order}"
                    ))?;
                    let rows = stmt.query_map([], row_to_announcement)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Updates an announcement.
    pub fn update_announcement(&self, id: &str, patch: &Announcement) -> SignageResult<Announcement> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE announcements SET location_id = ?2, title = ?3, message = ?4,
                        icon = ?5, priority = ?6, active = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    patch.location_id,
                    patch.title,
                    patch.message,
                    patch.icon,
                    patch.priority.as_str(),
                    patch.active as i64,
                    now_millis() as i64,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("announcement {id}")));
        }
        self.get_announcement(id)
    }

    /// Deletes an announcement.
    pub fn delete_announcement(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM announcements WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("announcement {id}")));
            }
            Ok(())
        })
    }
}
