use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts, companies, data room)");
        conn.execute_batch(&v1().replace("{now}", NOW))?;
    }

    if version < 2 {
        info!("Running migration v2 (points ledger, referrals)");
        conn.execute_batch(&v2().replace("{now}", NOW))?;
    }

    info!("Database migrations complete");
    Ok(())
}

fn v1() -> String {
    "
    CREATE TABLE users (
        id              TEXT PRIMARY KEY,
        email           TEXT NOT NULL UNIQUE,
        username        TEXT NOT NULL,
        password        TEXT NOT NULL,
        role            TEXT NOT NULL DEFAULT 'investor',
        referral_code   TEXT NOT NULL UNIQUE,
        referred_by     TEXT REFERENCES users(id),
        points          INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
        credits         INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL DEFAULT ({now}),
        last_login      TEXT
    );

    CREATE TABLE companies (
        id                  TEXT PRIMARY KEY,
        user_id             TEXT NOT NULL REFERENCES users(id),
        created_by          TEXT REFERENCES users(id),
        name                TEXT NOT NULL,
        status              TEXT NOT NULL DEFAULT 'draft',
        visibility          TEXT NOT NULL DEFAULT 'private',
        data_room_enabled   INTEGER NOT NULL DEFAULT 0,
        created_at          TEXT NOT NULL DEFAULT ({now}),
        updated_at          TEXT NOT NULL DEFAULT ({now})
    );

    CREATE TABLE company_permissions (
        id              TEXT PRIMARY KEY,
        company_id      TEXT NOT NULL REFERENCES companies(id),
        user_id         TEXT NOT NULL REFERENCES users(id),
        permission_type TEXT NOT NULL DEFAULT 'view',
        granted_by      TEXT NOT NULL REFERENCES users(id),
        expires_at      TEXT,
        notes           TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL DEFAULT ({now}),
        updated_at      TEXT NOT NULL DEFAULT ({now}),
        UNIQUE(company_id, user_id)
    );

    CREATE TABLE data_room_access (
        id              TEXT PRIMARY KEY,
        company_id      TEXT NOT NULL REFERENCES companies(id),
        user_id         TEXT NOT NULL REFERENCES users(id),
        granted_by      TEXT REFERENCES users(id),
        access_level    TEXT NOT NULL DEFAULT 'overview',
        nda_signed      INTEGER NOT NULL DEFAULT 0,
        nda_signed_at   TEXT,
        nda_document_id TEXT,
        status          TEXT NOT NULL DEFAULT 'active',
        expires_at      TEXT,
        notes           TEXT,
        created_at      TEXT NOT NULL DEFAULT ({now}),
        updated_at      TEXT NOT NULL DEFAULT ({now}),
        UNIQUE(company_id, user_id),
        CHECK (access_level = 'overview' OR nda_signed = 1)
    );

    CREATE TABLE data_room_folders (
        id              TEXT PRIMARY KEY,
        company_id      TEXT NOT NULL REFERENCES companies(id),
        name            TEXT NOT NULL,
        folder_type     TEXT NOT NULL DEFAULT 'other',
        description     TEXT,
        access_level    TEXT NOT NULL DEFAULT 'full_dd',
        sort_order      INTEGER NOT NULL DEFAULT 0,
        is_system       INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL DEFAULT ({now})
    );

    CREATE INDEX idx_folders_company
        ON data_room_folders(company_id, sort_order);

    CREATE TABLE data_room_files (
        id              TEXT PRIMARY KEY,
        company_id      TEXT NOT NULL REFERENCES companies(id),
        folder_id       TEXT NOT NULL REFERENCES data_room_folders(id),
        uploaded_by     TEXT NOT NULL REFERENCES users(id),
        filename        TEXT NOT NULL,
        mime_type       TEXT,
        file_size       INTEGER,
        storage_type    TEXT NOT NULL DEFAULT 'stored',
        external_link   TEXT,
        access_level    TEXT,
        download_count  INTEGER NOT NULL DEFAULT 0,
        version         INTEGER NOT NULL DEFAULT 1,
        is_latest       INTEGER NOT NULL DEFAULT 1,
        previous_version_id TEXT REFERENCES data_room_files(id),
        created_at      TEXT NOT NULL DEFAULT ({now})
    );

    CREATE INDEX idx_files_folder
        ON data_room_files(folder_id, is_latest);

    CREATE TABLE data_room_view_logs (
        id          TEXT PRIMARY KEY,
        company_id  TEXT NOT NULL REFERENCES companies(id),
        user_id     TEXT NOT NULL REFERENCES users(id),
        action      TEXT NOT NULL,
        folder_id   TEXT REFERENCES data_room_folders(id),
        file_id     TEXT REFERENCES data_room_files(id),
        user_agent  TEXT,
        ip_address  TEXT,
        created_at  TEXT NOT NULL DEFAULT ({now})
    );

    CREATE INDEX idx_view_logs_company
        ON data_room_view_logs(company_id, created_at);

    INSERT INTO schema_version (version) VALUES (1);
    "
    .to_string()
}

fn v2() -> String {
    "
    CREATE TABLE referrals (
        id              TEXT PRIMARY KEY,
        referrer_id     TEXT NOT NULL REFERENCES users(id),
        referred_id     TEXT NOT NULL UNIQUE REFERENCES users(id),
        points_earned   INTEGER NOT NULL DEFAULT 0,
        status          TEXT NOT NULL DEFAULT 'pending',
        created_at      TEXT NOT NULL DEFAULT ({now}),
        updated_at      TEXT NOT NULL DEFAULT ({now}),
        deleted_at      TEXT,
        CHECK (referrer_id != referred_id)
    );

    CREATE INDEX idx_referrals_referrer
        ON referrals(referrer_id, created_at);

    CREATE TABLE point_history (
        id          TEXT PRIMARY KEY,
        user_id     TEXT NOT NULL REFERENCES users(id),
        points      INTEGER NOT NULL,
        kind        TEXT NOT NULL,
        status      TEXT,
        description TEXT NOT NULL,
        related_id  TEXT,
        metadata    TEXT,
        created_at  TEXT NOT NULL DEFAULT ({now})
    );

    CREATE INDEX idx_point_history_user
        ON point_history(user_id, created_at);

    -- The ledger is append-only
    CREATE TRIGGER point_history_no_update BEFORE UPDATE ON point_history
    BEGIN
        SELECT RAISE(ABORT, 'point_history is append-only');
    END;

    CREATE TRIGGER point_history_no_delete BEFORE DELETE ON point_history
    BEGIN
        SELECT RAISE(ABORT, 'point_history is append-only');
    END;

    INSERT INTO schema_version (version) VALUES (2);
    "
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn point_history_rejects_updates_and_deletes() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, username, password, referral_code)
                 VALUES ('u1', 'a@example.com', 'a', 'x', 'AAAAAAAA');
             INSERT INTO point_history (id, user_id, points, kind, description)
                 VALUES ('p1', 'u1', 10, 'bonus', 'welcome');",
        )
        .unwrap();

        assert!(conn.execute("UPDATE point_history SET points = 99", []).is_err());
        assert!(conn.execute("DELETE FROM point_history", []).is_err());
    }

    #[test]
    fn nda_tiers_need_a_signature_at_the_schema_level() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, username, password, referral_code)
                 VALUES ('u1', 'a@example.com', 'a', 'x', 'AAAAAAAA');
             INSERT INTO companies (id, user_id, name) VALUES ('c1', 'u1', 'Acme');",
        )
        .unwrap();

        let unsigned = conn.execute(
            "INSERT INTO data_room_access (id, company_id, user_id, access_level)
             VALUES ('a1', 'c1', 'u1', 'nda')",
            [],
        );
        assert!(unsigned.is_err());
    }
}
