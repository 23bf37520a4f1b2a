use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    scheduled_for, Completion, GenerationSummary, MasteryRecord, MasteryStats, ReminderSummary,
    ReviewObligation, FINAL_INDEX,
};
use crate::error::{Result, ReviewError};
use crate::notify::{self, NotificationGateway, NotificationIntent};
use crate::points::{self, ScoreKind};
use crate::storage::{parse_column, Database};
use crate::users;
use crate::{SubmissionId, UserId};

const OBLIGATION_COLUMNS: &str = "id, user_id, submission_id, review_index, scheduled_date,
    origin_date, status, completed_at, system_advanced, is_mastered, mastered_at";

fn row_to_obligation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewObligation> {
    Ok(ReviewObligation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        submission_id: row.get(2)?,
        review_index: row.get(3)?,
        scheduled_date: row.get(4)?,
        origin_date: row.get(5)?,
        status: parse_column(row, 6)?,
        completed_at: row.get(7)?,
        system_advanced: row.get(8)?,
        is_mastered: row.get(9)?,
        mastered_at: row.get(10)?,
    })
}

fn row_to_mastery(row: &rusqlite::Row<'_>) -> rusqlite::Result<MasteryRecord> {
    Ok(MasteryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        submission_id: row.get(2)?,
        origin_date: row.get(3)?,
        mastered_date: row.get(4)?,
        total_days_to_master: row.get(5)?,
    })
}

fn obligation_by_id_in(conn: &Connection, id: i64) -> Result<ReviewObligation> {
    let sql = format!("SELECT {OBLIGATION_COLUMNS} FROM review_obligations WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_obligation)?)
}

fn pending_in(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
) -> Result<Option<ReviewObligation>> {
    let sql = format!(
        "SELECT {OBLIGATION_COLUMNS} FROM review_obligations
         WHERE user_id = ?1 AND submission_id = ?2 AND status = 'pending'"
    );
    Ok(conn
        .query_row(&sql, params![user_id, submission_id], row_to_obligation)
        .optional()?)
}

fn all_pending_in(conn: &Connection, user_id: UserId) -> Result<Vec<ReviewObligation>> {
    let sql = format!(
        "SELECT {OBLIGATION_COLUMNS} FROM review_obligations
         WHERE user_id = ?1 AND status = 'pending'
         ORDER BY scheduled_date, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id], row_to_obligation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn mastery_in(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
) -> Result<Option<MasteryRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, submission_id, origin_date, mastered_date, total_days_to_master
             FROM mastery_records WHERE user_id = ?1 AND submission_id = ?2",
            params![user_id, submission_id],
            row_to_mastery,
        )
        .optional()?)
}

fn chain_exists_in(conn: &Connection, user_id: UserId, submission_id: SubmissionId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM review_obligations WHERE user_id = ?1 AND submission_id = ?2)
             OR EXISTS(SELECT 1 FROM mastery_records WHERE user_id = ?1 AND submission_id = ?2)",
        params![user_id, submission_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn insert_pending_in(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
    review_index: u32,
    scheduled_date: NaiveDate,
    origin_date: NaiveDate,
) -> Result<ReviewObligation> {
    conn.execute(
        "INSERT INTO review_obligations
            (user_id, submission_id, review_index, scheduled_date, origin_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
        params![user_id, submission_id, review_index, scheduled_date, origin_date],
    )?;
    obligation_by_id_in(conn, conn.last_insert_rowid())
}

/// Start a chain for `submission_id` unless one already exists.
pub(crate) fn enroll_in(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
    grading_date: NaiveDate,
) -> Result<Option<ReviewObligation>> {
    if chain_exists_in(conn, user_id, submission_id)? {
        return Ok(None);
    }
    let Some(scheduled) = scheduled_for(grading_date, 0) else {
        return Ok(None);
    };
    let ob = insert_pending_in(conn, user_id, submission_id, 0, scheduled, grading_date)?;
    tracing::debug!(user_id, submission_id, %scheduled, "review chain enrolled");
    Ok(Some(ob))
}

/// Move every sufficiently overdue pending obligation one step forward.
fn upgrade_overdue_in(
    conn: &Connection,
    user_id: UserId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<u32> {
    let mut upgraded = 0;
    for ob in all_pending_in(conn, user_id)? {
        let Some((next_index, scheduled)) = ob.upgrade_target(today) else {
            continue;
        };
        let changed = conn.execute(
            "UPDATE review_obligations
             SET status = 'completed', completed_at = ?2, system_advanced = 1
             WHERE id = ?1 AND status = 'pending'",
            params![ob.id, now],
        )?;
        if changed == 0 {
            continue;
        }
        insert_pending_in(
            conn,
            user_id,
            ob.submission_id,
            next_index,
            scheduled,
            ob.origin_date,
        )?;
        tracing::debug!(
            user_id,
            submission_id = ob.submission_id,
            from = ob.review_index,
            to = next_index,
            %scheduled,
            "overdue review auto-advanced"
        );
        upgraded += 1;
    }
    Ok(upgraded)
}

fn due_in(
    conn: &Connection,
    user_id: UserId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<ReviewObligation>> {
    upgrade_overdue_in(conn, user_id, today, now)?;
    Ok(all_pending_in(conn, user_id)?
        .into_iter()
        .filter(|ob| ob.scheduled_date <= today)
        .collect())
}

/// Enroll qualifying graded submissions that never got a chain.
fn backfill_in(conn: &Connection, user_id: UserId, today: NaiveDate) -> Result<u32> {
    let mut stmt = conn.prepare(
        "SELECT g.submission_id, g.graded_on FROM graded_submissions g
         WHERE g.user_id = ?1
           AND g.grade IN ('good', 'excellent')
           AND g.graded_on < ?2
           AND NOT EXISTS (SELECT 1 FROM review_obligations r
                           WHERE r.user_id = g.user_id AND r.submission_id = g.submission_id)
           AND NOT EXISTS (SELECT 1 FROM mastery_records m
                           WHERE m.user_id = g.user_id AND m.submission_id = g.submission_id)
         ORDER BY g.submission_id",
    )?;
    let missing = stmt
        .query_map(params![user_id, today], |row| {
            Ok((row.get::<_, SubmissionId>(0)?, row.get::<_, NaiveDate>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut enrolled = 0;
    for (submission_id, graded_on) in missing {
        if enroll_in(conn, user_id, submission_id, graded_on)?.is_some() {
            enrolled += 1;
        }
    }
    Ok(enrolled)
}

pub(crate) fn complete_in(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Completion> {
    let Some(ob) = pending_in(conn, user_id, submission_id)? else {
        return Err(missing_pending_error(conn, user_id, submission_id)?.into());
    };

    conn.execute(
        "UPDATE review_obligations SET status = 'completed', completed_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![ob.id, now],
    )?;
    points::grant_fixed_in(
        conn,
        user_id,
        ScoreKind::ReviewComplete,
        today,
        Some(submission_id),
    )?;

    let next_index = ob.review_index + 1;
    if next_index > FINAL_INDEX {
        conn.execute(
            "UPDATE review_obligations SET is_mastered = 1, mastered_at = ?2 WHERE id = ?1",
            params![ob.id, now],
        )?;
        let total_days = (today - ob.origin_date).num_days();
        conn.execute(
            "INSERT OR IGNORE INTO mastery_records
                (user_id, submission_id, origin_date, mastered_date, total_days_to_master)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, submission_id, ob.origin_date, today, total_days],
        )?;
        let record = mastery_in(conn, user_id, submission_id)?.ok_or(
            ReviewError::ObligationNotFound {
                user_id,
                submission_id,
            },
        )?;
        tracing::info!(user_id, submission_id, total_days, "submission mastered");
        return Ok(Completion::Mastered {
            completed: obligation_by_id_in(conn, ob.id)?,
            record,
        });
    }

    let scheduled = scheduled_for(ob.origin_date, next_index).ok_or(
        ReviewError::ObligationNotFound {
            user_id,
            submission_id,
        },
    )?;
    let next = insert_pending_in(
        conn,
        user_id,
        submission_id,
        next_index,
        scheduled,
        ob.origin_date,
    )?;
    tracing::debug!(user_id, submission_id, next_index, %scheduled, "review completed");
    Ok(Completion::Advanced {
        completed: obligation_by_id_in(conn, ob.id)?,
        next,
    })
}

/// Why there is nothing to complete or skip.
fn missing_pending_error(
    conn: &Connection,
    user_id: UserId,
    submission_id: SubmissionId,
) -> Result<ReviewError> {
    Ok(if mastery_in(conn, user_id, submission_id)?.is_some() {
        ReviewError::AlreadyMastered {
            user_id,
            submission_id,
        }
    } else {
        ReviewError::ObligationNotFound {
            user_id,
            submission_id,
        }
    })
}

/// Spaced-review engine.
///
/// Every mutating operation runs in one IMMEDIATE transaction, so a learner's
/// completion and the overdue pass can never both advance the same pending row.
pub struct ReviewScheduler {
    db: Database,
    gateway: Arc<dyn NotificationGateway>,
}

impl ReviewScheduler {
    pub fn new(db: Database, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { db, gateway }
    }

    /// Start a review chain for a freshly graded submission.
    ///
    /// No-op (returns `None`) if the submission already has a chain or a
    /// mastery record.
    pub fn enroll(
        &self,
        user_id: UserId,
        submission_id: SubmissionId,
        grading_date: NaiveDate,
    ) -> Result<Option<ReviewObligation>> {
        self.db.transaction(|conn| {
            users::ensure_user_in(conn, user_id, Utc::now())?;
            enroll_in(conn, user_id, submission_id, grading_date)
        })
    }

    /// Daily batch pass over every active student.
    ///
    /// Each student is handled in their own transaction; a failure is logged
    /// and the pass moves on.
    pub fn generate_daily_queue(&self, today: NaiveDate) -> Result<GenerationSummary> {
        let students = self.db.read(users::active_students_in)?;
        let mut summary = GenerationSummary::default();
        for user_id in students {
            summary.users += 1;
            let result = self.db.transaction(|conn| {
                let enrolled = backfill_in(conn, user_id, today)?;
                let upgraded = upgrade_overdue_in(conn, user_id, today, Utc::now())?;
                Ok((enrolled, upgraded))
            });
            match result {
                Ok((enrolled, upgraded)) => {
                    summary.enrolled += enrolled;
                    summary.upgraded += upgraded;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(user_id, "daily review generation failed: {e}");
                }
            }
        }
        tracing::info!(
            %today,
            users = summary.users,
            enrolled = summary.enrolled,
            upgraded = summary.upgraded,
            failed = summary.failed,
            "daily review queue generated"
        );
        Ok(summary)
    }

    /// Auto-advance stale obligations for one user. Returns how many moved.
    pub fn auto_upgrade_overdue(&self, user_id: UserId, today: NaiveDate) -> Result<u32> {
        self.db
            .transaction(|conn| upgrade_overdue_in(conn, user_id, today, Utc::now()))
    }

    /// Pending obligations due on or before `today`, most overdue first.
    ///
    /// Overdue obligations are auto-advanced first, in the same transaction.
    pub fn list_due(&self, user_id: UserId, today: NaiveDate) -> Result<Vec<ReviewObligation>> {
        self.db
            .transaction(|conn| due_in(conn, user_id, today, Utc::now()))
    }

    /// Complete the pending review of a chain.
    ///
    /// # Errors
    /// `ReviewError::AlreadyMastered` if the chain already ended in mastery,
    /// `ReviewError::ObligationNotFound` if there is nothing pending.
    pub fn complete(
        &self,
        user_id: UserId,
        submission_id: SubmissionId,
        today: NaiveDate,
    ) -> Result<Completion> {
        let completion = self
            .db
            .transaction(|conn| complete_in(conn, user_id, submission_id, today, Utc::now()))?;
        if let Completion::Mastered { record, .. } = &completion {
            notify::deliver(
                self.gateway.as_ref(),
                user_id,
                NotificationIntent::MasteryAchieved {
                    submission_id,
                    total_days_to_master: record.total_days_to_master,
                },
            );
        }
        Ok(completion)
    }

    /// End a chain without mastery.
    pub fn skip(&self, user_id: UserId, submission_id: SubmissionId) -> Result<ReviewObligation> {
        self.db.transaction(|conn| {
            let Some(ob) = pending_in(conn, user_id, submission_id)? else {
                return Err(missing_pending_error(conn, user_id, submission_id)?.into());
            };
            conn.execute(
                "UPDATE review_obligations SET status = 'skipped' WHERE id = ?1",
                params![ob.id],
            )?;
            tracing::debug!(user_id, submission_id, index = ob.review_index, "review skipped");
            obligation_by_id_in(conn, ob.id)
        })
    }

    /// Every obligation of one chain, by review index.
    pub fn chain(&self, user_id: UserId, submission_id: SubmissionId) -> Result<Vec<ReviewObligation>> {
        self.db.read(|conn| {
            let sql = format!(
                "SELECT {OBLIGATION_COLUMNS} FROM review_obligations
                 WHERE user_id = ?1 AND submission_id = ?2
                 ORDER BY review_index"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, submission_id], row_to_obligation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn mastery_stats(&self, user_id: UserId, today: NaiveDate) -> Result<MasteryStats> {
        self.db.read(|conn| {
            let (mastered, pending, due): (u32, u32, u32) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM mastery_records WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM review_obligations
                        WHERE user_id = ?1 AND status = 'pending'),
                    (SELECT COUNT(*) FROM review_obligations
                        WHERE user_id = ?1 AND status = 'pending' AND scheduled_date <= ?2)",
                params![user_id, today],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(MasteryStats::new(mastered, pending, due))
        })
    }

    /// Mastery records, most recent first.
    pub fn list_mastered(&self, user_id: UserId) -> Result<Vec<MasteryRecord>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, submission_id, origin_date, mastered_date, total_days_to_master
                 FROM mastery_records WHERE user_id = ?1
                 ORDER BY mastered_date DESC, id DESC",
            )?;
            let rows = stmt
                .query_map(params![user_id], row_to_mastery)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Send one `review_due` intent to each active student with due reviews.
    pub fn send_due_reminders(&self, today: NaiveDate) -> Result<ReminderSummary> {
        let students = self.db.read(users::active_students_in)?;
        let mut summary = ReminderSummary::default();
        for user_id in students {
            let due = match self
                .db
                .transaction(|conn| due_in(conn, user_id, today, Utc::now()))
            {
                Ok(due) => due,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(user_id, "reminder check failed: {e}");
                    continue;
                }
            };
            if due.is_empty() {
                continue;
            }
            let most_overdue_days = due
                .iter()
                .map(|ob| ob.overdue_days(today))
                .max()
                .unwrap_or(0);
            notify::deliver(
                self.gateway.as_ref(),
                user_id,
                NotificationIntent::ReviewDue {
                    due_count: due.len() as u32,
                    most_overdue_days,
                },
            );
            summary.notified += 1;
        }
        tracing::info!(%today, notified = summary.notified, failed = summary.failed, "review reminders sent");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::notify::MemoryGateway;
    use crate::points::ScoreLedger;
    use crate::review::{ObligationStatus, INTERVALS};
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Database, Arc<MemoryGateway>, ReviewScheduler) {
        let db = Database::open_memory().unwrap();
        let gateway = Arc::new(MemoryGateway::new());
        let scheduler = ReviewScheduler::new(db.clone(), gateway.clone());
        (db, gateway, scheduler)
    }

    fn grade(db: &Database, user_id: UserId, submission_id: SubmissionId, grade: &str, on: NaiveDate) {
        db.transaction(|conn| {
            users::ensure_user_in(conn, user_id, Utc::now())?;
            conn.execute(
                "INSERT INTO graded_submissions (submission_id, user_id, grade, graded_on)
                 VALUES (?1, ?2, ?3, ?4)",
                params![submission_id, user_id, grade, on],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn enroll_is_idempotent() {
        let (_, _, s) = setup();
        let origin = day(2024, 1, 1);
        let first = s.enroll(1, 10, origin).unwrap().unwrap();
        assert_eq!(first.review_index, 0);
        assert_eq!(first.scheduled_date, day(2024, 1, 2));
        assert!(s.enroll(1, 10, origin).unwrap().is_none());
        assert_eq!(s.chain(1, 10).unwrap().len(), 1);
    }

    #[test]
    fn worked_scenario_from_grading_to_auto_advance() {
        let (db, _, s) = setup();
        let day0 = day(2024, 1, 1);
        s.enroll(1, 10, day0).unwrap();

        let day1 = day0 + Duration::days(1);
        assert_eq!(s.list_due(1, day1).unwrap().len(), 1);
        let completion = s.complete(1, 10, day1).unwrap();
        let Completion::Advanced { next, .. } = completion else {
            panic!("expected advance");
        };
        assert_eq!(next.review_index, 1);
        assert_eq!(next.scheduled_date, day0 + Duration::days(3));
        let grants = ScoreLedger::new(db).grants_of_kind(1, ScoreKind::ReviewComplete).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].value, 1);

        let day10 = day0 + Duration::days(10);
        let due = s.list_due(1, day10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].review_index, 2);
        assert_eq!(due[0].scheduled_date, day10);

        let chain = s.chain(1, 10).unwrap();
        assert!(chain[1].system_advanced);
        assert_eq!(chain[1].status, ObligationStatus::Completed);
    }

    #[test]
    fn abandoned_chain_never_exceeds_five_obligations() {
        let (db, _, s) = setup();
        let origin = day(2024, 1, 1);
        grade(&db, 1, 10, "excellent", origin);

        for offset in 1..=120 {
            let today = origin + Duration::days(offset);
            s.generate_daily_queue(today).unwrap();
            s.auto_upgrade_overdue(1, today).unwrap();
        }

        let chain = s.chain(1, 10).unwrap();
        assert_eq!(chain.len(), INTERVALS.len());
        let last = chain.last().unwrap();
        assert_eq!(last.review_index, FINAL_INDEX);
        assert_eq!(last.status, ObligationStatus::Pending);
        assert!(s.list_mastered(1).unwrap().is_empty());
    }

    #[test]
    fn final_completion_masters_once() {
        let (_, gateway, s) = setup();
        let origin = day(2024, 1, 1);
        s.enroll(1, 10, origin).unwrap();
        for &offset in &INTERVALS[..4] {
            let today = origin + Duration::days(offset);
            assert!(matches!(s.complete(1, 10, today).unwrap(), Completion::Advanced { .. }));
        }
        let mastered_on = origin + Duration::days(31);
        let completion = s.complete(1, 10, mastered_on).unwrap();
        let Completion::Mastered { completed, record } = completion else {
            panic!("expected mastery");
        };
        assert!(completed.is_mastered);
        assert_eq!(record.total_days_to_master, 31);

        let again = s.complete(1, 10, mastered_on).unwrap_err();
        assert!(matches!(
            again,
            CoreError::Review(ReviewError::AlreadyMastered { .. })
        ));
        assert_eq!(s.list_mastered(1).unwrap().len(), 1);
        assert!(s.enroll(1, 10, mastered_on).unwrap().is_none());

        let sent = gateway.sent_to(1);
        assert!(matches!(
            sent.as_slice(),
            [NotificationIntent::MasteryAchieved { submission_id: 10, .. }]
        ));
    }

    #[test]
    fn complete_without_chain_is_not_found() {
        let (_, _, s) = setup();
        let err = s.complete(1, 99, day(2024, 1, 1)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Review(ReviewError::ObligationNotFound { .. })
        ));
    }

    #[test]
    fn skip_ends_chain() {
        let (_, _, s) = setup();
        let origin = day(2024, 1, 1);
        s.enroll(1, 10, origin).unwrap();
        let skipped = s.skip(1, 10).unwrap();
        assert_eq!(skipped.status, ObligationStatus::Skipped);
        assert!(s.list_due(1, origin + Duration::days(5)).unwrap().is_empty());
        assert!(s.skip(1, 10).is_err());
        // A skipped chain is not restarted.
        assert!(s.enroll(1, 10, origin).unwrap().is_none());
    }

    #[test]
    fn generation_backfills_missing_chains() {
        let (db, _, s) = setup();
        grade(&db, 1, 10, "good", day(2024, 1, 1));
        grade(&db, 1, 11, "pending", day(2024, 1, 1));
        grade(&db, 2, 12, "excellent", day(2024, 1, 5));

        let summary = s.generate_daily_queue(day(2024, 1, 3)).unwrap();
        assert_eq!(summary.users, 2);
        assert_eq!(summary.enrolled, 1);
        assert_eq!(s.chain(1, 10).unwrap()[0].origin_date, day(2024, 1, 1));
        assert!(s.chain(1, 11).unwrap().is_empty());
        // Graded after today: left for a later pass.
        assert!(s.chain(2, 12).unwrap().is_empty());

        let again = s.generate_daily_queue(day(2024, 1, 3)).unwrap();
        assert_eq!(again.enrolled, 0);
    }

    #[test]
    fn one_corrupt_user_does_not_block_the_batch() {
        let (db, _, s) = setup();
        grade(&db, 1, 10, "good", day(2024, 1, 1));
        grade(&db, 2, 20, "good", day(2024, 1, 1));
        db.transaction(|conn| {
            conn.execute(
                "INSERT INTO review_obligations
                    (user_id, submission_id, review_index, scheduled_date, origin_date)
                 VALUES (1, 10, 0, 'not-a-date', '2024-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let summary = s.generate_daily_queue(day(2024, 1, 3)).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.enrolled, 1);
        assert_eq!(s.chain(2, 20).unwrap().len(), 1);
    }

    #[test]
    fn stats_and_reminders() {
        let (_, gateway, s) = setup();
        let origin = day(2024, 1, 1);
        s.enroll(1, 10, origin).unwrap();
        s.enroll(1, 11, origin + Duration::days(3)).unwrap();
        s.enroll(2, 20, origin + Duration::days(3)).unwrap();

        let today = origin + Duration::days(2);
        let stats = s.mastery_stats(1, today).unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.mastery_rate, 0.0);

        let summary = s.send_due_reminders(today).unwrap();
        assert_eq!(summary.notified, 1);
        assert_eq!(
            gateway.sent_to(1),
            vec![NotificationIntent::ReviewDue {
                due_count: 1,
                most_overdue_days: 1
            }]
        );
        assert!(gateway.sent_to(2).is_empty());
    }

    #[test]
    fn complete_racing_upgrade_keeps_one_pending() {
        use std::sync::Barrier;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyloop.db");
        let gateway = Arc::new(MemoryGateway::new());
        let completer = ReviewScheduler::new(Database::open_at(&path).unwrap(), gateway.clone());
        let upgrader = ReviewScheduler::new(Database::open_at(&path).unwrap(), gateway);

        let origin = day(2024, 1, 1);
        // Index 0 is due 01-02; by 01-04 it is overdue by the full gap to index 1.
        let today = day(2024, 1, 4);
        // One user per chain so each upgrade pass only sees the chain it races.
        for user_id in 1..=20 {
            completer.enroll(user_id, 100 + user_id, origin).unwrap();
        }

        for user_id in 1..=20 {
            let submission_id = 100 + user_id;
            let barrier = Barrier::new(2);
            std::thread::scope(|scope| {
                let complete = scope.spawn(|| {
                    barrier.wait();
                    completer.complete(user_id, submission_id, today)
                });
                let upgrade = scope.spawn(|| {
                    barrier.wait();
                    upgrader.auto_upgrade_overdue(user_id, today)
                });
                assert!(complete.join().unwrap().is_ok());
                assert!(upgrade.join().unwrap().is_ok());
            });

            let chain = completer.chain(user_id, submission_id).unwrap();
            let pending = chain
                .iter()
                .filter(|o| o.status == ObligationStatus::Pending)
                .count();
            assert_eq!(pending, 1, "submission {submission_id}");
            let indexes: Vec<u32> = chain.iter().map(|o| o.review_index).collect();
            let expected: Vec<u32> = (0..chain.len() as u32).collect();
            assert_eq!(indexes, expected);
            // Either order is a valid serialisation: 0 done then 1 pending,
            // or 0 auto-advanced, 1 completed, 2 pending.
            assert!(matches!(chain.len(), 2 | 3), "submission {submission_id}");
        }
    }

    #[test]
    fn delivery_failure_keeps_mastery() {
        let db = Database::open_memory().unwrap();
        let s = ReviewScheduler::new(db, Arc::new(MemoryGateway::failing()));
        let origin = day(2024, 1, 1);
        s.enroll(1, 10, origin).unwrap();
        for &offset in &INTERVALS {
            s.complete(1, 10, origin + Duration::days(offset)).unwrap();
        }
        assert_eq!(s.list_mastered(1).unwrap().len(), 1);
    }
}
