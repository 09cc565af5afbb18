use anyhow::Result;
use meridian_types::models::PointKind;
use rusqlite::Connection;
use uuid::Uuid;

use super::{enum_col, id_col, opt_id_col, ts_col};
use crate::models::PointHistoryRow;
use crate::timestamp;

/// Append a ledger entry. There is no update or delete counterpart.
pub fn insert_point_history(conn: &Connection, entry: &PointHistoryRow) -> Result<()> {
    conn.execute(
        "INSERT INTO point_history
            (id, user_id, points, kind, status, description, related_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            entry.id.to_string(),
            entry.user_id.to_string(),
            entry.points,
            entry.kind.as_str(),
            entry.status,
            entry.description,
            entry.related_id.map(|r| r.to_string()),
            entry.metadata,
            timestamp(entry.created_at),
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn point_history(
    conn: &Connection,
    user_id: Uuid,
    limit: u32,
) -> Result<Vec<PointHistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, points, kind, status, description, related_id, metadata, created_at
         FROM point_history
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_id.to_string(), limit], |row| {
            Ok(PointHistoryRow {
                id: id_col(row, 0)?,
                user_id: id_col(row, 1)?,
                points: row.get(2)?,
                kind: enum_col(row, 3)?,
                status: row.get(4)?,
                description: row.get(5)?,
                related_id: opt_id_col(row, 6)?,
                metadata: row.get(7)?,
                created_at: ts_col(row, 8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn ledger_sum(conn: &Connection, user_id: Uuid) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(points), 0) FROM point_history WHERE user_id = ?1",
        [user_id.to_string()],
        |r| r.get(0),
    )?)
}

pub fn count_entries(conn: &Connection, user_id: Uuid) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM point_history WHERE user_id = ?1",
        [user_id.to_string()],
        |r| r.get(0),
    )?)
}

pub fn has_entry_of_kind(conn: &Connection, user_id: Uuid, kind: PointKind) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM point_history WHERE user_id = ?1 AND kind = ?2)",
        [user_id.to_string(), kind.as_str().to_string()],
        |r| r.get(0),
    )?)
}
