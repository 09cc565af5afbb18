//! Referral programme.
//!
//! A new user may name a referrer's code at registration. The referral row is
//! recorded in one transaction together with the duplicate check and the
//! referrer's daily count; the two point awards that follow are independent
//! ledger transactions.

use chrono::{NaiveTime, Utc};
use meridian_db::models::ReferralRow;
use meridian_db::queries::{is_unique_violation, ledger as history, referrals, users};
use meridian_db::{Database, timestamp};
use meridian_types::api::{ReferralOutcome, ReferralStats};
use meridian_types::models::{PointKind, ReferralStatus, Role};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{Error, Ledger, Principal, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralPolicy {
    /// Welcome bonus for users who register without a usable code.
    pub base_referral_points: i64,
    /// Credited to both sides of a completed referral.
    pub referral_points: i64,
    /// Paid referrals per referrer per UTC day.
    pub daily_referral_limit: i64,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            base_referral_points: 50,
            referral_points: 100,
            daily_referral_limit: 10,
        }
    }
}

enum Registration {
    InvalidCode,
    SelfReferral,
    AlreadyReferred,
    Recorded {
        referral_id: Uuid,
        referrer_id: Uuid,
        capped: bool,
    },
}

pub struct ReferralService<'a> {
    db: &'a Database,
    policy: ReferralPolicy,
}

impl<'a> ReferralService<'a> {
    pub fn new(db: &'a Database, policy: ReferralPolicy) -> Self {
        Self { db, policy }
    }

    /// Settle the referral bonus for a freshly registered user.
    ///
    /// Only an unknown `new_user_id` is an error. Every other problem with
    /// the code, including storage failures before any points move, settles
    /// as a plain welcome bonus. A user is settled once: later calls report
    /// `already_referred` and pay nothing.
    pub fn process_referral(
        &self,
        new_user_id: Uuid,
        referral_code: Option<&str>,
    ) -> Result<ReferralOutcome> {
        if self.db.get_user(new_user_id)?.is_none() {
            return Err(Error::not_found("user", new_user_id));
        }
        if self.already_settled(new_user_id)? {
            info!("Referral for {} was already settled", new_user_id);
            return Ok(ReferralOutcome {
                status: ReferralStatus::AlreadyReferred,
                points_awarded: 0,
                referrer_points: 0,
            });
        }

        let Some(code) = normalize_code(referral_code) else {
            return self.base_bonus(new_user_id, ReferralStatus::NoReferral);
        };

        let registration = match self.register(new_user_id, &code) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(
                    "Referral processing for {} failed, paying base bonus: {}",
                    new_user_id, e
                );
                return self.base_bonus(new_user_id, ReferralStatus::NoReferral);
            }
        };

        match registration {
            Registration::InvalidCode => self.base_bonus(new_user_id, ReferralStatus::InvalidCode),
            Registration::SelfReferral => {
                info!("User {} tried to use their own referral code", new_user_id);
                self.base_bonus(new_user_id, ReferralStatus::SelfReferral)
            }
            Registration::AlreadyReferred => Ok(ReferralOutcome {
                status: ReferralStatus::AlreadyReferred,
                points_awarded: 0,
                referrer_points: 0,
            }),
            Registration::Recorded {
                referral_id,
                referrer_id,
                capped,
            } => Ok(self.pay_out(referral_id, referrer_id, new_user_id, capped)),
        }
    }

    /// A referral row or a welcome entry in the ledger.
    fn already_settled(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.db.with_conn(|conn| {
            Ok(referrals::get_referral_by_referred(conn, user_id)?.is_some()
                || history::has_entry_of_kind(conn, user_id, PointKind::Bonus)?
                || history::has_entry_of_kind(conn, user_id, PointKind::Referred)?)
        })?)
    }

    fn register(&self, new_user_id: Uuid, code: &str) -> Result<Registration> {
        let Some(referrer) = self.db.get_user_by_referral_code(code)? else {
            return Ok(Registration::InvalidCode);
        };
        if referrer.id == new_user_id {
            return Ok(Registration::SelfReferral);
        }

        match self.record(referrer.id, new_user_id) {
            Ok((referral_id, capped)) => Ok(Registration::Recorded {
                referral_id,
                referrer_id: referrer.id,
                capped,
            }),
            Err(Error::AlreadyReferred(_)) => Ok(Registration::AlreadyReferred),
            Err(e) => Err(e),
        }
    }

    /// Insert the referral row. Returns its id and whether the referrer had
    /// already hit today's cap.
    fn record(&self, referrer_id: Uuid, referred_id: Uuid) -> Result<(Uuid, bool)> {
        let start_of_day = timestamp(Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc());

        self.db.with_tx(|tx| {
            if referrals::get_referral_by_referred(tx, referred_id)?.is_some() {
                return Err(Error::AlreadyReferred(referred_id));
            }

            let today = referrals::count_referrals_since(tx, referrer_id, &start_of_day)?;
            let capped = today >= self.policy.daily_referral_limit;

            let referral = ReferralRow {
                id: Uuid::new_v4(),
                referrer_id,
                referred_id,
                points_earned: if capped { 0 } else { self.policy.referral_points },
                status: "completed".to_string(),
                created_at: Utc::now(),
                deleted_at: None,
            };
            match referrals::insert_referral(tx, &referral) {
                Err(e) if is_unique_violation(&e, "referrals.referred_id") => {
                    return Err(Error::AlreadyReferred(referred_id));
                }
                other => other?,
            }
            users::set_referred_by(tx, referred_id, referrer_id)?;

            if capped {
                info!(
                    "Referrer {} reached the daily limit ({}); {} recorded without a bonus",
                    referrer_id, self.policy.daily_referral_limit, referred_id
                );
            }
            Ok((referral.id, capped))
        })
    }

    /// Credit both sides of a recorded referral. Failures here are not
    /// compensated; they are logged for reconciliation.
    fn pay_out(
        &self,
        referral_id: Uuid,
        referrer_id: Uuid,
        referred_id: Uuid,
        capped: bool,
    ) -> ReferralOutcome {
        let ledger = Ledger::new(self.db);
        let points = self.policy.referral_points;

        let mut referrer_points = 0;
        if !capped {
            match ledger.award_points(
                referrer_id,
                points,
                PointKind::Referral,
                "Referral bonus",
                Some(referred_id),
            ) {
                Ok(_) => referrer_points = points,
                Err(e) => error!(
                    "Referral {}: referrer {} was not credited {} points: {}",
                    referral_id, referrer_id, points, e
                ),
            }
        }

        let points_awarded = match ledger.award_points(
            referred_id,
            points,
            PointKind::Referred,
            "Welcome bonus for joining through a referral",
            Some(referrer_id),
        ) {
            Ok(_) => points,
            Err(e) => {
                error!(
                    "Referral {}: referred user {} was not credited {} points \
                     (referrer credited {}): {}",
                    referral_id, referred_id, points, referrer_points, e
                );
                0
            }
        };

        ReferralOutcome {
            status: if capped {
                ReferralStatus::Capped
            } else {
                ReferralStatus::Completed
            },
            points_awarded,
            referrer_points,
        }
    }

    fn base_bonus(&self, user_id: Uuid, status: ReferralStatus) -> Result<ReferralOutcome> {
        let points = self.policy.base_referral_points;
        if points > 0 {
            Ledger::new(self.db).award_points(
                user_id,
                points,
                PointKind::Bonus,
                "Welcome bonus",
                None,
            )?;
        }
        Ok(ReferralOutcome {
            status,
            points_awarded: points.max(0),
            referrer_points: 0,
        })
    }

    pub fn referral_stats(&self, user_id: Uuid) -> Result<ReferralStats> {
        let user = self
            .db
            .get_user(user_id)?
            .ok_or_else(|| Error::not_found("user", user_id))?;
        let (referral_count, referral_points) =
            self.db.with_conn(|conn| referrals::referral_totals(conn, user_id))?;

        Ok(ReferralStats {
            referral_code: user.referral_code,
            referral_count,
            referral_points,
        })
    }

    pub fn verify_code(&self, code: &str) -> Result<bool> {
        let Some(code) = normalize_code(Some(code)) else {
            return Ok(false);
        };
        Ok(self.db.get_user_by_referral_code(&code)?.is_some())
    }

    /// Soft-delete a referral. The referred user still counts as referred.
    pub fn void_referral(&self, actor: &Principal, referral_id: Uuid) -> Result<()> {
        actor.require_role(&[Role::Admin])?;
        let voided = self.db.with_conn(|conn| {
            referrals::soft_delete_referral(conn, referral_id, &meridian_db::now())
        })?;
        if !voided {
            return Err(Error::not_found("referral", referral_id));
        }
        info!("Referral {} voided by {}", referral_id, actor.user_id);
        Ok(())
    }
}

fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, user};
    use meridian_db::queries::ledger;

    fn code_of(db: &Database, id: Uuid) -> String {
        db.get_user(id).unwrap().unwrap().referral_code
    }

    fn balance(db: &Database, id: Uuid) -> i64 {
        Ledger::new(db).get_balance(id).unwrap()
    }

    #[test]
    fn no_code_pays_the_base_bonus() {
        let db = db();
        let newcomer = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());

        for code in [None, Some(""), Some("   ")] {
            let fresh = user(&db, Role::Investor);
            let outcome = service.process_referral(fresh.user_id, code).unwrap();
            assert_eq!(outcome.status, ReferralStatus::NoReferral);
            assert_eq!(outcome.points_awarded, 50);
        }

        service.process_referral(newcomer.user_id, None).unwrap();
        assert_eq!(balance(&db, newcomer.user_id), 50);
        let history = Ledger::new(&db).history(newcomer.user_id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, PointKind::Bonus);
    }

    #[test]
    fn completed_referral_credits_both_sides() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let bob = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());

        // Codes are matched case-insensitively and trimmed.
        let code = format!("  {} ", code_of(&db, alice.user_id).to_lowercase());
        let outcome = service.process_referral(bob.user_id, Some(&code)).unwrap();

        assert_eq!(
            outcome,
            ReferralOutcome {
                status: ReferralStatus::Completed,
                points_awarded: 100,
                referrer_points: 100,
            }
        );
        assert_eq!(balance(&db, alice.user_id), 100);
        assert_eq!(balance(&db, bob.user_id), 100);

        let referral = db
            .with_conn(|c| referrals::get_referral_by_referred(c, bob.user_id))
            .unwrap()
            .unwrap();
        assert_eq!(referral.referrer_id, alice.user_id);
        assert_eq!(referral.points_earned, 100);
        assert_eq!(referral.status, "completed");
        assert_eq!(
            db.get_user(bob.user_id).unwrap().unwrap().referred_by,
            Some(alice.user_id)
        );

        let stats = service.referral_stats(alice.user_id).unwrap();
        assert_eq!(stats.referral_count, 1);
        assert_eq!(stats.referral_points, 100);
    }

    #[test]
    fn invalid_and_self_referral_codes_fall_back_to_base_bonus() {
        let db = db();
        let carol = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());

        let outcome = service.process_referral(carol.user_id, Some("NOSUCH99")).unwrap();
        assert_eq!(outcome.status, ReferralStatus::InvalidCode);
        assert_eq!(outcome.points_awarded, 50);

        let dave = user(&db, Role::Investor);
        let own = code_of(&db, dave.user_id);
        let outcome = service.process_referral(dave.user_id, Some(&own)).unwrap();
        assert_eq!(outcome.status, ReferralStatus::SelfReferral);
        assert_eq!(balance(&db, dave.user_id), 50);
        assert!(db
            .with_conn(|c| referrals::get_referral_by_referred(c, dave.user_id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn a_user_is_referred_at_most_once() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let other = user(&db, Role::Investor);
        let bob = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());

        service
            .process_referral(bob.user_id, Some(&code_of(&db, alice.user_id)))
            .unwrap();
        let again = service
            .process_referral(bob.user_id, Some(&code_of(&db, other.user_id)))
            .unwrap();

        assert_eq!(again.status, ReferralStatus::AlreadyReferred);
        assert_eq!(again.points_awarded, 0);
        assert_eq!(balance(&db, bob.user_id), 100);
        assert_eq!(balance(&db, other.user_id), 0);

        let count: i64 = db
            .with_conn(|c| {
                Ok(c.query_row(
                    "SELECT COUNT(*) FROM referrals WHERE referred_id = ?1",
                    [bob.user_id.to_string()],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn settling_twice_without_a_code_pays_once() {
        let db = db();
        let erin = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());

        service.process_referral(erin.user_id, None).unwrap();
        for code in [None, Some("NOSUCH99")] {
            let again = service.process_referral(erin.user_id, code).unwrap();
            assert_eq!(again.status, ReferralStatus::AlreadyReferred);
            assert_eq!(again.points_awarded, 0);
        }

        assert_eq!(balance(&db, erin.user_id), 50);
        assert_eq!(db.with_conn(|c| ledger::count_entries(c, erin.user_id)).unwrap(), 1);
    }

    #[test]
    fn daily_cap_records_a_zero_point_referral() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let policy = ReferralPolicy {
            daily_referral_limit: 2,
            ..ReferralPolicy::default()
        };
        let service = ReferralService::new(&db, policy);
        let code = code_of(&db, alice.user_id);

        for _ in 0..2 {
            let invitee = user(&db, Role::Investor);
            let outcome = service.process_referral(invitee.user_id, Some(&code)).unwrap();
            assert_eq!(outcome.status, ReferralStatus::Completed);
        }
        assert_eq!(balance(&db, alice.user_id), 200);

        let late = user(&db, Role::Investor);
        let outcome = service.process_referral(late.user_id, Some(&code)).unwrap();
        assert_eq!(
            outcome,
            ReferralOutcome {
                status: ReferralStatus::Capped,
                points_awarded: 100,
                referrer_points: 0,
            }
        );
        assert_eq!(balance(&db, alice.user_id), 200);
        assert_eq!(balance(&db, late.user_id), 100);

        let referral = db
            .with_conn(|c| referrals::get_referral_by_referred(c, late.user_id))
            .unwrap()
            .unwrap();
        assert_eq!(referral.points_earned, 0);
    }

    #[test]
    fn unknown_new_user_is_not_found() {
        let db = db();
        let service = ReferralService::new(&db, ReferralPolicy::default());
        assert!(matches!(
            service.process_referral(Uuid::new_v4(), None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn balances_stay_consistent_across_referrals() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());
        let code = code_of(&db, alice.user_id);

        let mut invitees = Vec::new();
        for _ in 0..3 {
            let invitee = user(&db, Role::Investor);
            service.process_referral(invitee.user_id, Some(&code)).unwrap();
            invitees.push(invitee.user_id);
        }

        for id in invitees.into_iter().chain([alice.user_id]) {
            let sum = db.with_conn(|c| ledger::ledger_sum(c, id)).unwrap();
            assert_eq!(balance(&db, id), sum);
        }
    }

    #[test]
    fn voided_referrals_still_block_re_referral() {
        let db = db();
        let admin = user(&db, Role::Admin);
        let alice = user(&db, Role::Investor);
        let bob = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());
        let code = code_of(&db, alice.user_id);

        service.process_referral(bob.user_id, Some(&code)).unwrap();
        let referral = db
            .with_conn(|c| referrals::get_referral_by_referred(c, bob.user_id))
            .unwrap()
            .unwrap();

        assert!(matches!(
            service.void_referral(&bob, referral.id),
            Err(Error::Forbidden)
        ));
        service.void_referral(&admin, referral.id).unwrap();
        assert!(matches!(
            service.void_referral(&admin, referral.id),
            Err(Error::NotFound(_))
        ));

        assert_eq!(service.referral_stats(alice.user_id).unwrap().referral_count, 0);
        let again = service.process_referral(bob.user_id, Some(&code)).unwrap();
        assert_eq!(again.status, ReferralStatus::AlreadyReferred);
    }

    #[test]
    fn verify_code_checks_existence() {
        let db = db();
        let alice = user(&db, Role::Investor);
        let service = ReferralService::new(&db, ReferralPolicy::default());
        assert!(service.verify_code(&code_of(&db, alice.user_id)).unwrap());
        assert!(!service.verify_code("ZZZZZZZZ").unwrap());
        assert!(!service.verify_code("").unwrap());
    }
}
