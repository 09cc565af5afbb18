use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{OptionalExt, enum_col, id_col, opt_id_col, ts_col};
use crate::models::{FileRow, FolderRow, ViewLogEntryRow, ViewLogRow, VisitorStatsRow};
use crate::now;

const FOLDER_COLUMNS: &str =
    "id, company_id, name, folder_type, description, access_level, sort_order, is_system";

const FILE_COLUMNS: &str = "id, company_id, folder_id, uploaded_by, filename, mime_type, file_size,
     storage_type, external_link, access_level, download_count, version, is_latest,
     previous_version_id, created_at";

// -- Folders --

pub fn count_folders(conn: &Connection, company_id: Uuid) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM data_room_folders WHERE company_id = ?1",
        [company_id.to_string()],
        |r| r.get(0),
    )?)
}

pub fn insert_folder(conn: &Connection, folder: &FolderRow) -> Result<()> {
    conn.execute(
        "INSERT INTO data_room_folders
            (id, company_id, name, folder_type, description, access_level, sort_order, is_system,
             created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            folder.id.to_string(),
            folder.company_id.to_string(),
            folder.name,
            folder.folder_type.as_str(),
            folder.description,
            folder.access_level.as_str(),
            folder.sort_order,
            folder.is_system,
            now(),
        ],
    )?;
    Ok(())
}

pub fn get_folder(conn: &Connection, id: Uuid) -> Result<Option<FolderRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {FOLDER_COLUMNS} FROM data_room_folders WHERE id = ?1"))?;
    stmt.query_row([id.to_string()], map_folder).optional()
}

pub fn list_folders(conn: &Connection, company_id: Uuid) -> Result<Vec<FolderRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLDER_COLUMNS} FROM data_room_folders
         WHERE company_id = ?1
         ORDER BY sort_order ASC, created_at ASC"
    ))?;
    let rows = stmt
        .query_map([company_id.to_string()], map_folder)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Write back the editable folder fields.
pub fn update_folder(conn: &Connection, folder: &FolderRow) -> Result<()> {
    conn.execute(
        "UPDATE data_room_folders SET name = ?2, description = ?3, access_level = ?4
         WHERE id = ?1",
        rusqlite::params![
            folder.id.to_string(),
            folder.name,
            folder.description,
            folder.access_level.as_str(),
        ],
    )?;
    Ok(())
}

fn map_folder(row: &Row<'_>) -> rusqlite::Result<FolderRow> {
    Ok(FolderRow {
        id: id_col(row, 0)?,
        company_id: id_col(row, 1)?,
        name: row.get(2)?,
        folder_type: enum_col(row, 3)?,
        description: row.get(4)?,
        access_level: enum_col(row, 5)?,
        sort_order: row.get(6)?,
        is_system: row.get(7)?,
    })
}

// -- Files --

pub fn insert_file(conn: &Connection, file: &FileRow) -> Result<()> {
    conn.execute(
        "INSERT INTO data_room_files
            (id, company_id, folder_id, uploaded_by, filename, mime_type, file_size, storage_type,
             external_link, access_level, download_count, version, is_latest,
             previous_version_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        rusqlite::params![
            file.id.to_string(),
            file.company_id.to_string(),
            file.folder_id.to_string(),
            file.uploaded_by.to_string(),
            file.filename,
            file.mime_type,
            file.file_size,
            file.storage_type.as_str(),
            file.external_link,
            file.access_level.map(|l| l.as_str()),
            file.download_count,
            file.version,
            file.is_latest,
            file.previous_version_id.map(|id| id.to_string()),
            crate::timestamp(file.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_file(conn: &Connection, id: Uuid) -> Result<Option<FileRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM data_room_files WHERE id = ?1"))?;
    stmt.query_row([id.to_string()], map_file).optional()
}

/// Latest versions of every file in a company's data room.
pub fn list_latest_files(conn: &Connection, company_id: Uuid) -> Result<Vec<FileRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM data_room_files
         WHERE company_id = ?1 AND is_latest = 1
         ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map([company_id.to_string()], map_file)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_file_latest(conn: &Connection, file_id: Uuid, is_latest: bool) -> Result<()> {
    conn.execute(
        "UPDATE data_room_files SET is_latest = ?2 WHERE id = ?1",
        rusqlite::params![file_id.to_string(), is_latest],
    )?;
    Ok(())
}

/// Delete one file version. The version it replaced becomes latest again if
/// the deleted one was latest, and any newer version is relinked past it.
/// View-log entries keep their counts but lose the file reference.
pub fn delete_file(conn: &Connection, file: &FileRow) -> Result<()> {
    let id = file.id.to_string();
    let previous = file.previous_version_id.map(|p| p.to_string());

    conn.execute(
        "UPDATE data_room_view_logs SET file_id = NULL WHERE file_id = ?1",
        [&id],
    )?;
    conn.execute(
        "UPDATE data_room_files SET previous_version_id = ?2 WHERE previous_version_id = ?1",
        rusqlite::params![id, previous],
    )?;
    conn.execute("DELETE FROM data_room_files WHERE id = ?1", [&id])?;

    if let (true, Some(previous)) = (file.is_latest, file.previous_version_id) {
        set_file_latest(conn, previous, true)?;
    }
    Ok(())
}

pub fn increment_download_count(conn: &Connection, file_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE data_room_files SET download_count = download_count + 1 WHERE id = ?1",
        [file_id.to_string()],
    )?;
    Ok(())
}

fn map_file(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    // Stored levels that no longer parse fall back to the folder's tier.
    let access_level = row
        .get::<_, Option<String>>(9)?
        .and_then(|raw| raw.parse().ok());

    Ok(FileRow {
        id: id_col(row, 0)?,
        company_id: id_col(row, 1)?,
        folder_id: id_col(row, 2)?,
        uploaded_by: id_col(row, 3)?,
        filename: row.get(4)?,
        mime_type: row.get(5)?,
        file_size: row.get(6)?,
        storage_type: enum_col(row, 7)?,
        external_link: row.get(8)?,
        access_level,
        download_count: row.get(10)?,
        version: row.get(11)?,
        is_latest: row.get(12)?,
        previous_version_id: opt_id_col(row, 13)?,
        created_at: ts_col(row, 14)?,
    })
}

// -- View logs --

pub fn insert_view_log(conn: &Connection, log: &ViewLogRow) -> Result<()> {
    conn.execute(
        "INSERT INTO data_room_view_logs
            (id, company_id, user_id, action, folder_id, file_id, user_agent, ip_address,
             created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            log.company_id.to_string(),
            log.user_id.to_string(),
            log.action.as_str(),
            log.folder_id.map(|f| f.to_string()),
            log.file_id.map(|f| f.to_string()),
            log.user_agent,
            log.ip_address,
            now(),
        ],
    )?;
    Ok(())
}

pub fn count_view_logs(conn: &Connection, company_id: Uuid, action: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM data_room_view_logs WHERE company_id = ?1 AND action = ?2",
        [company_id.to_string(), action.to_string()],
        |r| r.get(0),
    )?)
}

/// Per-visitor totals, most active visitor first.
pub fn visitor_stats(conn: &Connection, company_id: Uuid) -> Result<Vec<VisitorStatsRow>> {
    let mut stmt = conn.prepare(
        "SELECT l.user_id, u.username, u.role, COUNT(*),
                SUM(CASE WHEN l.action = 'download_file' THEN 1 ELSE 0 END),
                COUNT(DISTINCT l.folder_id), COUNT(DISTINCT l.file_id), MAX(l.created_at)
         FROM data_room_view_logs l
         JOIN users u ON u.id = l.user_id
         WHERE l.company_id = ?1
         GROUP BY l.user_id
         ORDER BY COUNT(*) DESC, MAX(l.created_at) DESC",
    )?;
    let rows = stmt
        .query_map([company_id.to_string()], |row| {
            Ok(VisitorStatsRow {
                user_id: id_col(row, 0)?,
                username: row.get(1)?,
                role: enum_col(row, 2)?,
                total_views: row.get(3)?,
                downloads: row.get(4)?,
                folders_viewed: row.get(5)?,
                files_viewed: row.get(6)?,
                last_view_at: ts_col(row, 7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Newest view-log entries first.
pub fn recent_view_logs(
    conn: &Connection,
    company_id: Uuid,
    limit: u32,
) -> Result<Vec<ViewLogEntryRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, action, folder_id, file_id, created_at
         FROM data_room_view_logs
         WHERE company_id = ?1
         ORDER BY created_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![company_id.to_string(), limit], |row| {
            Ok(ViewLogEntryRow {
                user_id: id_col(row, 0)?,
                action: enum_col(row, 1)?,
                folder_id: opt_id_col(row, 2)?,
                file_id: opt_id_col(row, 3)?,
                created_at: ts_col(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
