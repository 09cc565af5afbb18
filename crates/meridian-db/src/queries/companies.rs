use anyhow::Result;
use meridian_types::models::{CompanyStatus, Visibility};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{OptionalExt, enum_col, id_col, opt_id_col};
use crate::models::CompanyRow;
use crate::{Database, now};

impl Database {
    pub fn create_company(
        &self,
        id: Uuid,
        owner_id: Uuid,
        created_by: Option<Uuid>,
        name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO companies (id, user_id, created_by, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    id.to_string(),
                    owner_id.to_string(),
                    created_by.map(|u| u.to_string()),
                    name,
                    ts,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_company(&self, id: Uuid) -> Result<Option<CompanyRow>> {
        self.with_conn(|conn| get_company(conn, id))
    }

    /// Apply a review decision. Returns false when the company does not exist.
    pub fn review_company(
        &self,
        id: Uuid,
        status: CompanyStatus,
        visibility: Option<Visibility>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE companies
                 SET status = ?1, visibility = COALESCE(?2, visibility), updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![
                    status.as_str(),
                    visibility.map(|v| v.as_str()),
                    now(),
                    id.to_string(),
                ],
            )?;
            Ok(changed == 1)
        })
    }
}

pub fn get_company(conn: &Connection, id: Uuid) -> Result<Option<CompanyRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, created_by, name, status, visibility, data_room_enabled
         FROM companies WHERE id = ?1",
    )?;
    stmt.query_row([id.to_string()], map_company).optional()
}

pub fn set_data_room_enabled(conn: &Connection, id: Uuid, enabled: bool) -> Result<()> {
    conn.execute(
        "UPDATE companies SET data_room_enabled = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![enabled, now(), id.to_string()],
    )?;
    Ok(())
}

fn map_company(row: &Row<'_>) -> rusqlite::Result<CompanyRow> {
    Ok(CompanyRow {
        id: id_col(row, 0)?,
        user_id: id_col(row, 1)?,
        created_by: opt_id_col(row, 2)?,
        name: row.get(3)?,
        status: enum_col(row, 4)?,
        visibility: enum_col(row, 5)?,
        data_room_enabled: row.get(6)?,
    })
}
