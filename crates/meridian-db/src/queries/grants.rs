use anyhow::Result;
use meridian_types::models::GrantStatus;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{OptionalExt, enum_col, id_col, opt_id_col, opt_ts_col};
use crate::models::{DataRoomAccessRow, PermissionRow};
use crate::{now, timestamp};

// -- Data room access --

pub fn get_data_room_access(
    conn: &Connection,
    company_id: Uuid,
    user_id: Uuid,
) -> Result<Option<DataRoomAccessRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, user_id, granted_by, access_level, nda_signed, nda_signed_at,
                nda_document_id, status, expires_at, notes
         FROM data_room_access WHERE company_id = ?1 AND user_id = ?2",
    )?;
    stmt.query_row(
        [company_id.to_string(), user_id.to_string()],
        map_data_room_access,
    )
    .optional()
}

/// Insert or fully replace the (company, user) row. An existing row keeps its id.
pub fn upsert_data_room_access(conn: &Connection, row: &DataRoomAccessRow) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO data_room_access
            (id, company_id, user_id, granted_by, access_level, nda_signed, nda_signed_at,
             nda_document_id, status, expires_at, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
         ON CONFLICT(company_id, user_id) DO UPDATE SET
            granted_by = excluded.granted_by,
            access_level = excluded.access_level,
            nda_signed = excluded.nda_signed,
            nda_signed_at = excluded.nda_signed_at,
            nda_document_id = excluded.nda_document_id,
            status = excluded.status,
            expires_at = excluded.expires_at,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        rusqlite::params![
            row.id.to_string(),
            row.company_id.to_string(),
            row.user_id.to_string(),
            row.granted_by.map(|u| u.to_string()),
            row.access_level.as_str(),
            row.nda_signed,
            row.nda_signed_at.map(timestamp),
            row.nda_document_id.map(|d| d.to_string()),
            row.status.as_str(),
            row.expires_at.map(timestamp),
            row.notes,
            ts,
        ],
    )?;
    Ok(())
}

pub fn set_data_room_access_status(
    conn: &Connection,
    company_id: Uuid,
    user_id: Uuid,
    status: GrantStatus,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE data_room_access SET status = ?1, updated_at = ?2
         WHERE company_id = ?3 AND user_id = ?4",
        rusqlite::params![status.as_str(), now(), company_id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}

fn map_data_room_access(row: &Row<'_>) -> rusqlite::Result<DataRoomAccessRow> {
    Ok(DataRoomAccessRow {
        id: id_col(row, 0)?,
        company_id: id_col(row, 1)?,
        user_id: id_col(row, 2)?,
        granted_by: opt_id_col(row, 3)?,
        access_level: enum_col(row, 4)?,
        nda_signed: row.get(5)?,
        nda_signed_at: opt_ts_col(row, 6)?,
        nda_document_id: opt_id_col(row, 7)?,
        status: enum_col(row, 8)?,
        expires_at: opt_ts_col(row, 9)?,
        notes: row.get(10)?,
    })
}

// -- Company permissions --

pub fn get_company_permission(
    conn: &Connection,
    company_id: Uuid,
    user_id: Uuid,
) -> Result<Option<PermissionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, user_id, permission_type, granted_by, expires_at, notes, is_active
         FROM company_permissions WHERE company_id = ?1 AND user_id = ?2",
    )?;
    stmt.query_row([company_id.to_string(), user_id.to_string()], |row| {
        Ok(PermissionRow {
            id: id_col(row, 0)?,
            company_id: id_col(row, 1)?,
            user_id: id_col(row, 2)?,
            permission_type: enum_col(row, 3)?,
            granted_by: id_col(row, 4)?,
            expires_at: opt_ts_col(row, 5)?,
            notes: row.get(6)?,
            is_active: row.get(7)?,
        })
    })
    .optional()
}

pub fn upsert_company_permission(conn: &Connection, row: &PermissionRow) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO company_permissions
            (id, company_id, user_id, permission_type, granted_by, expires_at, notes, is_active,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(company_id, user_id) DO UPDATE SET
            permission_type = excluded.permission_type,
            granted_by = excluded.granted_by,
            expires_at = excluded.expires_at,
            notes = excluded.notes,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at",
        rusqlite::params![
            row.id.to_string(),
            row.company_id.to_string(),
            row.user_id.to_string(),
            row.permission_type.as_str(),
            row.granted_by.to_string(),
            row.expires_at.map(timestamp),
            row.notes,
            row.is_active,
            ts,
        ],
    )?;
    Ok(())
}

pub fn set_company_permission_active(
    conn: &Connection,
    company_id: Uuid,
    user_id: Uuid,
    active: bool,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE company_permissions SET is_active = ?1, updated_at = ?2
         WHERE company_id = ?3 AND user_id = ?4",
        rusqlite::params![active, now(), company_id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}
