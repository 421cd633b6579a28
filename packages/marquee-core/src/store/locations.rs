//! Location persistence.

use rusqlite::{params, Row};
use serde_json::json;

use crate::error::{SignageError, SignageResult};
use crate::model::Location;

use super::{column_to_json, json_to_column, Store};

fn row_to_location(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        lat: row.get(4)?,
        lon: row.get(5)?,
        timezone: row.get(6)?,
        config: column_to_json(&row.get::<_, String>(7)?, json!({})),
    })
}

const LOCATION_COLUMNS: &str = "id, client_id, name, address, lat, lon, timezone, config";

impl Store {
    /// Inserts a location under its owning client.
    pub fn insert_location(&self, location: &Location) -> SignageResult<Location> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO locations (id, client_id, name, address, lat, lon, timezone, config)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    location.id,
                    location.client_id,
                    location.name,
                    location.address,
                    location.lat,
                    location.lon,
                    location.timezone,
                    json_to_column(&location.config),
                ],
            )?;
            Ok(())
        })?;
        self.get_location(&location.id)
    }

    /// Fetches a location by id.
    pub fn get_location(&self, id: &str) -> SignageResult<Location> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?1"),
                params![id],
                row_to_location,
            )
            .map_err(|_| SignageError::NotFound(format!("location {id}")))
        })
    }

    /// Lists locations, optionally scoped to one tenant.
    pub fn list_locations(&self, client_id: Option<&str>) -> SignageResult<Vec<Location>> {
        self.with_conn(|conn| {
            let rows = match client_id {
                Some(client) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {LOCATION_COLUMNS} FROM locations WHERE client_id = ?1 ORDER BY name"
                    ))?;
                    let rows = stmt.query_map(params![client], row_to_location)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY name"
                    ))?;
                    let rows = stmt.query_map([], row_to_location)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Updates mutable location fields.
    pub fn update_location(&self, id: &str, patch: &Location) -> SignageResult<Location> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE locations SET name = ?2, address = ?3, lat = ?4, lon = ?5,
                        timezone = ?6, config = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.address,
                    patch.lat,
                    patch.lon,
                    patch.timezone,
                    json_to_column(&patch.config),
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("location {id}")));
        }
        self.get_location(id)
    }

    /// Deletes a location. Screens at it keep their rows with
    /// `location_id` nulled by the FK action.
    pub fn delete_location(&self, id: &str) -> SignageResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM locations WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("location {id}")));
            }
            Ok(())
        })
    }
}
