use anyhow::{Result, anyhow};
use rand::Rng;
use rusqlite::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use super::{OptionalExt, enum_col, id_col, is_unique_violation, opt_id_col, ts_col};
use crate::models::{NewUser, UserRow};
use crate::{Database, now};

/// Excludes characters that are easy to confuse (0/O, 1/I).
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_ATTEMPTS: usize = 8;

const USER_COLUMNS: &str =
    "id, email, username, password, role, referral_code, referred_by, points, credits, created_at";

pub fn generate_referral_code() -> String {
    let mut rng = rand::rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.random_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

impl Database {
    /// Insert a user with a fresh referral code, retrying on code collisions.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<UserRow> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            match self.with_conn(|conn| insert_user(conn, user, &code)) {
                Ok(()) => {
                    return self
                        .get_user(user.id)?
                        .ok_or_else(|| anyhow!("User vanished after insert: {}", user.id));
                }
                Err(e) if is_unique_violation(&e, "users.referral_code") => {
                    debug!("Referral code collision on {}, retrying", code);
                }
                Err(e) => return Err(e),
            }
        }
        Err(anyhow!("Could not allocate a unique referral code"))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| get_user(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"), email)
        })
    }

    pub fn get_user_by_referral_code(&self, code: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| get_user_by_referral_code(conn, code))
    }

    pub fn touch_last_login(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                (now(), id.to_string()),
            )?;
            Ok(())
        })
    }
}

pub fn insert_user(conn: &Connection, user: &NewUser<'_>, referral_code: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, username, password, role, referral_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            user.id.to_string(),
            user.email,
            user.username,
            user.password_hash,
            user.role.as_str(),
            referral_code,
            now(),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    query_user(
        conn,
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        &id.to_string(),
    )
}

pub fn get_user_by_referral_code(conn: &Connection, code: &str) -> Result<Option<UserRow>> {
    query_user(
        conn,
        &format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = ?1"),
        code,
    )
}

/// Current cached balance, `None` when the user does not exist.
pub fn user_points(conn: &Connection, id: Uuid) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT points FROM users WHERE id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )
    .optional()
}

/// Only the ledger may call this, inside the transaction that appends the
/// matching history row.
pub fn set_user_points(conn: &Connection, id: Uuid, points: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET points = ?1 WHERE id = ?2",
        (points, id.to_string()),
    )?;
    if changed != 1 {
        return Err(anyhow!("User not found: {}", id));
    }
    Ok(())
}

pub fn set_referred_by(conn: &Connection, id: Uuid, referrer_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE users SET referred_by = ?1 WHERE id = ?2",
        (referrer_id.to_string(), id.to_string()),
    )?;
    Ok(())
}

fn query_user(conn: &Connection, sql: &str, param: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    stmt.query_row([param], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: id_col(row, 0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password: row.get(3)?,
        role: enum_col(row, 4)?,
        referral_code: row.get(5)?,
        referred_by: opt_id_col(row, 6)?,
        points: row.get(7)?,
        credits: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}
