use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use super::{OptionalExt, id_col, opt_ts_col, ts_col};
use crate::models::ReferralRow;
use crate::timestamp;

/// Looks through soft-deleted rows too: a user can be referred once, ever.
pub fn get_referral_by_referred(
    conn: &Connection,
    referred_id: Uuid,
) -> Result<Option<ReferralRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, referrer_id, referred_id, points_earned, status, created_at, deleted_at
         FROM referrals WHERE referred_id = ?1",
    )?;
    stmt.query_row([referred_id.to_string()], |row| {
        Ok(ReferralRow {
            id: id_col(row, 0)?,
            referrer_id: id_col(row, 1)?,
            referred_id: id_col(row, 2)?,
            points_earned: row.get(3)?,
            status: row.get(4)?,
            created_at: ts_col(row, 5)?,
            deleted_at: opt_ts_col(row, 6)?,
        })
    })
    .optional()
}

/// Referrals by `referrer_id` created at or after `since` (an RFC 3339 timestamp).
/// Soft-deleted rows still count against the cap.
pub fn count_referrals_since(conn: &Connection, referrer_id: Uuid, since: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1 AND created_at >= ?2",
        [referrer_id.to_string(), since.to_string()],
        |r| r.get(0),
    )?)
}

pub fn insert_referral(conn: &Connection, referral: &ReferralRow) -> Result<()> {
    let created = timestamp(referral.created_at);
    conn.execute(
        "INSERT INTO referrals
            (id, referrer_id, referred_id, points_earned, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![
            referral.id.to_string(),
            referral.referrer_id.to_string(),
            referral.referred_id.to_string(),
            referral.points_earned,
            referral.status,
            created,
        ],
    )?;
    Ok(())
}

/// (number of referred users, points earned from them), excluding soft-deleted rows.
pub fn referral_totals(conn: &Connection, referrer_id: Uuid) -> Result<(i64, i64)> {
    Ok(conn.query_row(
        "SELECT COUNT(DISTINCT referred_id), COALESCE(SUM(points_earned), 0)
         FROM referrals WHERE referrer_id = ?1 AND deleted_at IS NULL",
        [referrer_id.to_string()],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?)
}

pub fn soft_delete_referral(conn: &Connection, id: Uuid, at: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE referrals SET deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND deleted_at IS NULL",
        [at.to_string(), id.to_string()],
    )?;
    Ok(changed == 1)
}
