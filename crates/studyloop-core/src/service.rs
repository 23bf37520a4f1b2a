//! The studyloop core as seen by collaborators.
//!
//! [`StudyCore`] consumes inbound events (grading, user actions) and answers
//! the outbound queries. It owns no state of its own beyond the injected
//! database, clock and notification gateway.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::activity::{self, ActivityKind, ActivityLedger, ChartDay, RecordOutcome};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ReviewError};
use crate::events::Event;
use crate::grade::Grade;
use crate::leaderboard::{Leaderboard, LeaderboardEntry, Period, PeriodKind};
use crate::notify::{self, NotificationGateway, NotificationIntent};
use crate::points::{self, ScoreGrant, ScoreLedger};
use crate::review::{
    self, Completion, GenerationSummary, MasteryRecord, MasteryStats, ReminderSummary,
    ReviewObligation, ReviewScheduler,
};
use crate::storage::{Config, Database};
use crate::streak::{self, StreakTracker};
use crate::users::{self, UserDirectory};
use crate::{SubmissionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningOverview {
    #[serde(flatten)]
    pub streak: StreakSummary,
    pub total_points: u64,
    pub month_points: u64,
    pub quarter_points: u64,
    pub week_checkins: u32,
}

/// What a grading event changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub grade: Grade,
    pub grant: Option<ScoreGrant>,
    pub enrolled: Option<ReviewObligation>,
}

/// Result of [`StudyCore::complete_review`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Advanced { next: ReviewObligation },
    Mastered { record: MasteryRecord },
    /// The chain had already ended in mastery; nothing changed.
    AlreadyMastered { submission_id: SubmissionId },
}

pub struct StudyCore {
    db: Database,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn NotificationGateway>,
    users: UserDirectory,
    activity: ActivityLedger,
    streaks: StreakTracker,
    scores: ScoreLedger,
    scheduler: ReviewScheduler,
    leaderboard: Leaderboard,
    default_limit: u32,
}

impl StudyCore {
    pub fn new(db: Database, clock: Arc<dyn Clock>, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            users: UserDirectory::new(db.clone()),
            activity: ActivityLedger::new(db.clone()),
            streaks: StreakTracker::new(db.clone()),
            scores: ScoreLedger::new(db.clone()),
            scheduler: ReviewScheduler::new(db.clone(), Arc::clone(&gateway)),
            leaderboard: Leaderboard::new(db.clone()),
            default_limit: Config::default().leaderboard.default_limit,
            db,
            clock,
            gateway,
        }
    }

    /// Apply the config values the facade reads (leaderboard window size).
    pub fn with_config(mut self, config: &Config) -> Self {
        self.default_limit = config.leaderboard.default_limit;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    /// Local calendar day according to the injected clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ── Inbound ──────────────────────────────────────────────────────

    pub fn dispatch(&self, event: Event) -> Result<()> {
        match event {
            Event::SubmissionGraded {
                user_id,
                submission_id,
                grade,
                graded_date,
            } => self
                .on_submission_graded(user_id, submission_id, grade, graded_date)
                .map(|_| ()),
            Event::UserAction {
                user_id,
                action_kind,
                occurred_date,
            } => self
                .on_user_action(user_id, action_kind, occurred_date)
                .map(|_| ()),
        }
    }

    /// Record a grade, award its quality points and enroll it for review.
    ///
    /// Re-delivery of the same grading event does not double-award.
    pub fn on_submission_graded(
        &self,
        user_id: UserId,
        submission_id: SubmissionId,
        grade: Grade,
        graded_date: NaiveDate,
    ) -> Result<GradeOutcome> {
        let rule = grade.rule();
        let now = self.clock.now();
        self.db.transaction(|conn| {
            users::ensure_user_in(conn, user_id, now)?;
            conn.execute(
                "INSERT INTO graded_submissions (submission_id, user_id, grade, graded_on)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(submission_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    grade = excluded.grade,
                    graded_on = excluded.graded_on",
                params![submission_id, user_id, grade.as_str(), graded_date],
            )?;

            let grant = match rule.grant {
                Some(kind) => {
                    points::grant_fixed_in(conn, user_id, kind, graded_date, Some(submission_id))?
                }
                None => None,
            };
            let enrolled = if rule.enrolls_review {
                review::enroll_in(conn, user_id, submission_id, graded_date)?
            } else {
                None
            };
            tracing::info!(
                user_id,
                submission_id,
                grade = grade.as_str(),
                enrolled = enrolled.is_some(),
                "submission graded"
            );
            Ok(GradeOutcome {
                grade,
                grant,
                enrolled,
            })
        })
    }

    /// Record a user action and notify about any streak bonus it earned.
    pub fn on_user_action(
        &self,
        user_id: UserId,
        kind: ActivityKind,
        date: NaiveDate,
    ) -> Result<RecordOutcome> {
        let now = self.clock.now();
        let outcome = self
            .db
            .transaction(|conn| activity::record_in(conn, user_id, kind, date, now))?;
        self.notify_streak_bonus(user_id, &outcome);
        Ok(outcome)
    }

    fn notify_streak_bonus(&self, user_id: UserId, outcome: &RecordOutcome) {
        let Some(advance) = &outcome.streak else {
            return;
        };
        if let Some(points) = advance.bonus_granted {
            notify::deliver(
                self.gateway.as_ref(),
                user_id,
                NotificationIntent::StreakBonus {
                    streak: advance.current_streak,
                    points,
                    description: advance.bonus_description.clone().unwrap_or_default(),
                },
            );
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_streak_summary(&self, user_id: UserId) -> Result<StreakSummary> {
        let state = self.streaks.state(user_id)?;
        Ok(StreakSummary {
            current_streak: state.current_streak,
            best_streak: state.best_streak,
            last_activity_date: state.last_activity_date,
        })
    }

    pub fn get_due_reviews(&self, user_id: UserId, today: NaiveDate) -> Result<Vec<ReviewObligation>> {
        self.scheduler.list_due(user_id, today)
    }

    /// Complete the pending review of a chain.
    ///
    /// Completing an already mastered chain is a successful no-op. A genuine
    /// completion also counts as the day's `review_complete` activity; the
    /// chain step and the activity commit together or not at all.
    pub fn complete_review(
        &self,
        user_id: UserId,
        submission_id: SubmissionId,
        today: NaiveDate,
    ) -> Result<ReviewOutcome> {
        let now = self.clock.now();
        let committed = self.db.transaction(|conn| {
            let completion = review::complete_in(conn, user_id, submission_id, today, now)?;
            let activity =
                activity::record_in(conn, user_id, ActivityKind::ReviewComplete, today, now)?;
            Ok((completion, activity))
        });
        let (completion, activity) = match committed {
            Ok(committed) => committed,
            Err(CoreError::Review(ReviewError::AlreadyMastered { .. })) => {
                return Ok(ReviewOutcome::AlreadyMastered { submission_id });
            }
            Err(e) => return Err(e),
        };

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
        self.notify_streak_bonus(user_id, &activity);

        Ok(match completion {
            Completion::Advanced { next, .. } => ReviewOutcome::Advanced { next },
            Completion::Mastered { record, .. } => ReviewOutcome::Mastered { record },
        })
    }

    pub fn skip_review(&self, user_id: UserId, submission_id: SubmissionId) -> Result<ReviewObligation> {
        self.scheduler.skip(user_id, submission_id)
    }

    /// Ranked view of a month or quarter. `limit` defaults to the configured window.
    pub fn get_leaderboard(
        &self,
        kind: PeriodKind,
        year: i32,
        value: u32,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let period = Period::new(kind, year, value)?;
        self.leaderboard
            .rank(period, limit.unwrap_or(self.default_limit))
    }

    pub fn rank_of(&self, user_id: UserId, period: Period) -> Result<Option<LeaderboardEntry>> {
        self.leaderboard.rank_of(user_id, period)
    }

    pub fn checkin_chart(&self, user_id: UserId, today: NaiveDate, days: u32) -> Result<Vec<ChartDay>> {
        self.activity.checkin_chart(user_id, today, days)
    }

    pub fn learning_overview(&self, user_id: UserId, today: NaiveDate) -> Result<LearningOverview> {
        self.db.read(|conn| {
            let state = streak::load_state_in(conn, user_id)?;
            let totals = points::totals_in(conn, user_id, today)?;
            let week_checkins = activity::week_checkins_in(conn, user_id, today)?;
            Ok(LearningOverview {
                streak: StreakSummary {
                    current_streak: state.current_streak,
                    best_streak: state.best_streak,
                    last_activity_date: state.last_activity_date,
                },
                total_points: totals.total,
                month_points: totals.month,
                quarter_points: totals.quarter,
                week_checkins,
            })
        })
    }

    pub fn score_history(&self, user_id: UserId, limit: u32) -> Result<Vec<ScoreGrant>> {
        self.scores.history(user_id, limit)
    }

    pub fn mastery_stats(&self, user_id: UserId, today: NaiveDate) -> Result<MasteryStats> {
        self.scheduler.mastery_stats(user_id, today)
    }

    pub fn list_mastered(&self, user_id: UserId) -> Result<Vec<MasteryRecord>> {
        self.scheduler.list_mastered(user_id)
    }

    pub fn generate_daily_queue(&self, today: NaiveDate) -> Result<GenerationSummary> {
        self.scheduler.generate_daily_queue(today)
    }

    pub fn send_due_reminders(&self, today: NaiveDate) -> Result<ReminderSummary> {
        self.scheduler.send_due_reminders(today)
    }
}
