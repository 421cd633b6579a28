//! Tenant persistence.

use rusqlite::{params, Row};
use serde_json::json;

use crate::error::{SignageError, SignageResult};
use crate::model::{Client, Plan, BOOTSTRAP_TENANT};
use crate::utils::{now_millis, validate_slug};

use super::{column_to_json, json_to_column, Store};

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        logo_url: row.get(3)?,
        branding: column_to_json(&row.get::<_, String>(4)?, json!({})),
        contact: row.get(5)?,
        plan: Plan::parse(&row.get::<_, String>(6)?),
        active: row.get::<_, i64>(7)? != 0,
        created_at: row.get::<_, i64>(8)? as u64,
        updated_at: row.get::<_, i64>(9)? as u64,
    })
}

const CLIENT_COLUMNS: &str =
    "id, name, slug, logo_url, branding, contact, plan, active, created_at, updated_at";

impl Store {
    /// Inserts a new tenant. The slug must be unique and URL-safe.
    pub fn insert_client(&self, client: &Client) -> SignageResult<Client> {
        if !validate_slug(&client.slug) {
            return Err(SignageError::InvalidInput(format!(
                "invalid slug {:?}",
                client.slug
            )));
        }
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO clients (id, name, slug, logo_url, branding, contact, plan, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    client.id,
                    client.name,
                    client.slug,
                    client.logo_url,
                    json_to_column(&client.branding),
                    client.contact,
                    client.plan.as_str(),
                    client.active as i64,
                    now as i64,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    SignageError::Conflict(format!("client slug {:?} already exists", client.slug))
                }
                other => other.into(),
            })?;
            Ok(())
        })?;
        self.get_client(&client.id)
    }

    /// Fetches a tenant by id.
    pub fn get_client(&self, id: &str) -> SignageResult<Client> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"),
                params![id],
                row_to_client,
            )
            .map_err(|_| SignageError::NotFound(format!("client {id}")))
        })
    }

    /// Lists all tenants.
    pub fn list_clients(&self) -> SignageResult<Vec<Client>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name"))?;
            let rows = stmt.query_map([], row_to_client)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Updates mutable tenant fields.
    pub fn update_client(&self, id: &str, patch: &Client) -> SignageResult<Client> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE clients SET name = ?2, logo_url = ?3, branding = ?4, contact = ?5,
                        plan = ?6, active = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.logo_url,
                    json_to_column(&patch.branding),
                    patch.contact,
                    patch.plan.as_str(),
                    patch.active as i64,
                    now_millis() as i64,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(SignageError::NotFound(format!("client {id}")));
        }
        self.get_client(id)
    }

    /// Deletes a tenant and, through FK cascade, everything it owns.
    ///
    /// The bootstrap tenant is protected.
    pub fn delete_client(&self, id: &str) -> SignageResult<()> {
        if id == BOOTSTRAP_TENANT {
            return Err(SignageError::Forbidden(format!(
                "the {BOOTSTRAP_TENANT} tenant cannot be deleted"
            )));
        }
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM clients WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(SignageError::NotFound(format!("client {id}")));
            }
            Ok(())
        })
    }
}
