//! Schedule persistence.

use rusqlite::{params, Row};

use crate::error::{SignageError, SignageResult};
use crate::model::Schedule;
use crate::utils::now_millis;

use super::Store;

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let days_text: String = row.get(6)?;
    Ok(Schedule {
        id: row.get(0)?,
        client_id: row.get(1)?,
        playlist_id: row.get(2)?,
        screen_target: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        days: serde_json::from_str(&days_text).unwrap_or_default(),
        priority: row.get(7)?,
        enabled: row.get::<_, i64>(8)? != 0,
        created_at: row.get::<_, i64>(9)? as u64,
        updated_at: row.get::<_, i64>(10)? as u64,
    })
}

const SCHEDULE_COLUMNS: &str = "id, client_id, playlist_id, screen_target, start_time, end_time, \
                                days, priority, enabled, created_at, updated_at";

impl Store {
    /// Inserts a schedule. The referenced playlist must exist.
    pub fn insert_schedule(&self, schedule: &Schedule) -> SignageResult<Schedule> {
        schedule.validate()?;
        self.get_playlist(&schedule.playlist_id)?;
        let days = serde_json::to_string(&schedule.days)?;
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO schedules (id, client_id, playlist_id, screen_target, start_time, end_time,
                                        days, priority, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    schedule.id,
                    schedule.client_id,
                    schedule.playlist_id,
                    schedule.screen_target,
                    schedule.start_time,
                    schedule.end_time,
                    days,
                    schedule.priority,
                    schedule.enabled as i64,
                    now as i64,
                ],
            )?;
            Ok(())
        })?;
        self.get_schedule(&schedule.id)
    }

    /// Fetches a schedule by id.
    pub fn get_schedule(&self, id: &str) -> SignageResult<Schedule> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                params![id],
                row_to_schedule,
            )
            .map_err(|_| SignageError::NotFound(format!("schedule {id}")))
        })
    }

    /// Lists schedules, optionally scoped to one tenant.
    pub fn list_schedules(&self, client_id: Option<&str>) -> SignageResult<Vec<Schedule>> {
        self.with_conn(|conn| {
            let rows = match client_id {
                Some(client) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE client_id = ?1 ORDER BY priority DESC, created_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![client], row_to_schedule)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY priority DESC, created_at DESC"
                    ))?;
                    let rows = stmt.query_map([], row_to_schedule)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Updates a schedule.
    pub fn update_schedule(&self, id: &str, patch: &Schedule) -> SignageResult<Schedule> {
        patch.validate()?;
        self.get_playlist(&patch.playlist_id)?;
        let days = serde_json::to_string(&patch.days)?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE schedules SET playlist_id = ?2, screen_target = ?3, start_time = ?4,
                        end_time = ?5, days = ?6, priority = ?7, enabled = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    id,
                    patch.playlist_id,
                    patch.screen_target,
                    patch.start_time,
                    patch.end_time,
                    days,
                    patch.priority,
                    patch.enabled as i64,
                    now_millis() as i64,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("schedule {id}")));
        }
        self.get_schedule(id)
    }

    /// Deletes a schedule.
    pub fn delete_schedule(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("schedule {id}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BOOTSTRAP_TENANT;

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_playlist(&crate::store::make_playlist("p1", &[10]))
            .unwrap();
        store
    }

    pub(crate) fn make_schedule(id: &str, priority: i32) -> Schedule {
        Schedule {
            id: id.into(),
            client_id: BOOTSTRAP_TENANT.into(),
            playlist_id: "p1".into(),
            screen_target: "all".into(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            days: vec![1, 2, 3, 4, 5],
            priority,
            enabled: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn crud_round_trip() {
        let store = seeded_store();
        store.insert_schedule(&make_schedule("s1", 0)).unwrap();
        let loaded = store.get_schedule("s1").unwrap();
        assert_eq!(loaded.days, vec![1, 2, 3, 4, 5]);
        assert_eq!(loaded.screen_target, "all");

        let mut patch = loaded.clone();
        patch.priority = 10;
        patch.enabled = false;
        store.update_schedule("s1", &patch).unwrap();
        let reloaded = store.get_schedule("s1").unwrap();
        assert_eq!(reloaded.priority, 10);
        assert!(!reloaded.enabled);

        store.delete_schedule("s1").unwrap();
        assert!(store.get_schedule("s1").is_err());
    }

    #[test]
    fn unknown_playlist_rejected() {
        let store = seeded_store();
        let mut schedule = make_schedule("s1", 0);
        schedule.playlist_id = "ghost".into();
        assert_eq!(
            store.insert_schedule(&schedule).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn playlist_delete_cascades_schedules() {
        let store = seeded_store();
        store.insert_schedule(&make_schedule("s1", 0)).unwrap();
        store.delete_playlist("p1").unwrap();
        assert!(store.get_schedule("s1").is_err());
    }

    #[test]
    fn list_orders_by_priority() {
        let store = seeded_store();
        store.insert_schedule(&make_schedule("s-low", 0)).unwrap();
        store.insert_schedule(&make_schedule("s-high", 10)).unwrap();
        let all = store.list_schedules(Some(BOOTSTRAP_TENANT)).unwrap();
        assert_eq!(all[0].id, "s-high");
    }
}
