//! Points ledger. Every balance change is one transaction that updates the
//! cached `users.points` counter and appends the matching history entry.

use chrono::Utc;
use meridian_db::Database;
use meridian_db::models::PointHistoryRow;
use meridian_db::queries::{ledger, users};
use meridian_types::api::{BalanceAudit, PointEntry};
use meridian_types::models::PointKind;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Error, Result};

const COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub entry_id: Uuid,
    pub new_balance: i64,
}

pub struct Ledger<'a> {
    db: &'a Database,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn award_points(
        &self,
        user_id: Uuid,
        delta: i64,
        kind: PointKind,
        description: &str,
        related_id: Option<Uuid>,
    ) -> Result<Award> {
        self.award_with_metadata(user_id, delta, kind, description, related_id, None)
    }

    /// Apply `delta` to the user's balance. A result below zero is rejected
    /// with `InsufficientBalance` and nothing is written.
    pub fn award_with_metadata(
        &self,
        user_id: Uuid,
        delta: i64,
        kind: PointKind,
        description: &str,
        related_id: Option<Uuid>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Award> {
        if delta == 0 {
            return Err(Error::InvalidInput("point change must be non-zero".into()));
        }
        let metadata = metadata.map(serde_json::Value::to_string);

        let award = self.db.with_tx(|tx| {
            let balance = users::user_points(tx, user_id)?
                .ok_or_else(|| Error::not_found("user", user_id))?;

            let new_balance = balance
                .checked_add(delta)
                .ok_or_else(|| Error::InvalidInput(format!("point change {delta} overflows")))?;
            if new_balance < 0 {
                return Err(Error::InsufficientBalance { balance, delta });
            }

            users::set_user_points(tx, user_id, new_balance)?;

            let entry_id = Uuid::new_v4();
            ledger::insert_point_history(
                tx,
                &PointHistoryRow {
                    id: entry_id,
                    user_id,
                    points: delta,
                    kind,
                    status: Some(COMPLETED.to_string()),
                    description: description.to_string(),
                    related_id,
                    metadata,
                    created_at: Utc::now(),
                },
            )?;

            Ok(Award {
                entry_id,
                new_balance,
            })
        })?;

        info!(
            "Points {:+} ({}) for {}, balance now {}",
            delta, kind, user_id, award.new_balance
        );
        Ok(award)
    }

    pub fn get_balance(&self, user_id: Uuid) -> Result<i64> {
        self.db
            .with_conn(|conn| users::user_points(conn, user_id))?
            .ok_or_else(|| Error::not_found("user", user_id))
    }

    /// Newest entries first.
    pub fn history(&self, user_id: Uuid, limit: u32) -> Result<Vec<PointEntry>> {
        let rows = self.db.with_conn(|conn| {
            if users::user_points(conn, user_id)?.is_none() {
                return Ok(None);
            }
            ledger::point_history(conn, user_id, limit).map(Some)
        })?;
        let rows = rows.ok_or_else(|| Error::not_found("user", user_id))?;

        Ok(rows.into_iter().map(to_entry).collect())
    }

    /// Compare the cached balance with the sum of the ledger.
    pub fn audit_balance(&self, user_id: Uuid) -> Result<BalanceAudit> {
        let (cached, ledger_sum) = self.db.with_conn(|conn| {
            let cached = users::user_points(conn, user_id)?;
            let sum = ledger::ledger_sum(conn, user_id)?;
            Ok((cached, sum))
        })?;
        let cached = cached.ok_or_else(|| Error::not_found("user", user_id))?;

        let consistent = cached == ledger_sum;
        if !consistent {
            warn!(
                "Balance drift for {}: cached {} vs ledger {}",
                user_id, cached, ledger_sum
            );
        }
        Ok(BalanceAudit {
            cached,
            ledger_sum,
            consistent,
        })
    }
}

fn to_entry(row: PointHistoryRow) -> PointEntry {
    // Metadata is free-form; keep unparseable blobs as plain strings.
    let metadata = row.metadata.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });
    PointEntry {
        id: row.id,
        points: row.points,
        kind: row.kind,
        status: row.status,
        description: row.description,
        related_id: row.related_id,
        metadata,
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, user};
    use meridian_types::models::Role;

    fn entry_count(db: &Database, user_id: Uuid) -> i64 {
        db.with_conn(|c| ledger::count_entries(c, user_id)).unwrap()
    }

    #[test]
    fn balance_matches_ledger_after_any_sequence() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let ledger = Ledger::new(&db);

        for (delta, kind) in [
            (100, PointKind::Referral),
            (25, PointKind::Task),
            (-40, PointKind::Adjustment),
            (7, PointKind::BandwidthSharing),
            (-92, PointKind::Adjustment),
        ] {
            ledger.award_points(alice.user_id, delta, kind, "test", None).unwrap();
            let audit = ledger.audit_balance(alice.user_id).unwrap();
            assert!(audit.consistent, "{audit:?}");
        }

        assert_eq!(ledger.get_balance(alice.user_id).unwrap(), 0);
        assert_eq!(entry_count(&db, alice.user_id), 5);
    }

    #[test]
    fn overdraft_is_rejected_without_partial_writes() {
        let db = db();
        let bob = user(&db, Role::Investor);
        let ledger = Ledger::new(&db);
        ledger.award_points(bob.user_id, 30, PointKind::Bonus, "welcome", None).unwrap();

        let err = ledger
            .award_points(bob.user_id, -31, PointKind::Adjustment, "too much", None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                balance: 30,
                delta: -31
            }
        ));

        assert_eq!(ledger.get_balance(bob.user_id).unwrap(), 30);
        assert_eq!(entry_count(&db, bob.user_id), 1);

        let award = ledger
            .award_points(bob.user_id, -30, PointKind::Adjustment, "all of it", None)
            .unwrap();
        assert_eq!(award.new_balance, 0);
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = db();
        let ledger = Ledger::new(&db);
        let ghost = Uuid::new_v4();
        assert!(matches!(
            ledger.award_points(ghost, 10, PointKind::Task, "x", None),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(ledger.get_balance(ghost), Err(Error::NotFound(_))));
        assert!(matches!(ledger.history(ghost, 10), Err(Error::NotFound(_))));
    }

    #[test]
    fn zero_change_is_invalid() {
        let db = db();
        let carol = user(&db, Role::Investor);
        let result = Ledger::new(&db).award_points(carol.user_id, 0, PointKind::Task, "noop", None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(entry_count(&db, carol.user_id), 0);
    }

    #[test]
    fn history_is_newest_first_and_keeps_metadata() {
        let db = db();
        let dave = user(&db, Role::Investor);
        let ledger = Ledger::new(&db);
        let meta = serde_json::json!({ "ipv4": "203.0.113.7", "ipv6": null });

        ledger.award_points(dave.user_id, 50, PointKind::Bonus, "welcome", None).unwrap();
        ledger
            .award_with_metadata(
                dave.user_id,
                12,
                PointKind::BandwidthSharing,
                "bandwidth",
                None,
                Some(&meta),
            )
            .unwrap();

        let history = ledger.history(dave.user_id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, PointKind::BandwidthSharing);
        assert_eq!(history[0].metadata.as_ref(), Some(&meta));
        assert_eq!(history[1].kind, PointKind::Bonus);
        assert_eq!(history[1].status.as_deref(), Some(COMPLETED));

        assert_eq!(ledger.history(dave.user_id, 1).unwrap().len(), 1);
    }

    #[test]
    fn audit_reports_drift_from_out_of_band_writes() {
        let db = db();
        let erin = user(&db, Role::Investor);
        let ledger = Ledger::new(&db);
        ledger.award_points(erin.user_id, 40, PointKind::Task, "task", None).unwrap();

        db.with_conn(|c| users::set_user_points(c, erin.user_id, 45)).unwrap();

        let audit = ledger.audit_balance(erin.user_id).unwrap();
        assert_eq!(
            audit,
            BalanceAudit {
                cached: 45,
                ledger_sum: 40,
                consistent: false
            }
        );
    }
}
