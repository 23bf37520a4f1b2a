//! Ebbinghaus spaced review.
//!
//! A qualifying grade starts a chain of at most five obligations, one per
//! entry of [`INTERVALS`]. Every scheduled date is anchored on the chain's
//! `origin_date`, never on the previous completion. Chain lifecycle:
//!
//! ```text
//! pending --complete--> completed --(index < 4)--> next pending
//!                                 \-(index = 4)--> mastered (terminal)
//! pending --skip------> skipped (terminal)
//! pending --overdue past next gap--> completed (system_advanced) --> next pending
//! ```

mod scheduler;

pub(crate) use scheduler::{complete_in, enroll_in};
pub use scheduler::ReviewScheduler;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{SubmissionId, UserId};

/// Days from `origin_date` at which each review falls due.
pub const INTERVALS: [i64; 5] = [1, 3, 7, 15, 30];

/// Index of the review whose completion means mastery.
pub const FINAL_INDEX: u32 = (INTERVALS.len() - 1) as u32;

/// Scheduled date of review `index` for a chain anchored at `origin`.
pub fn scheduled_for(origin: NaiveDate, index: u32) -> Option<NaiveDate> {
    INTERVALS
        .get(index as usize)
        .map(|days| origin + Duration::days(*days))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    Pending,
    Completed,
    Skipped,
}

impl ObligationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObligationStatus::Pending => "pending",
            ObligationStatus::Completed => "completed",
            ObligationStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObligationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ObligationStatus::Pending),
            "completed" => Ok(ObligationStatus::Completed),
            "skipped" => Ok(ObligationStatus::Skipped),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown obligation status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewObligation {
    pub id: i64,
    pub user_id: UserId,
    pub submission_id: SubmissionId,
    pub review_index: u32,
    pub scheduled_date: NaiveDate,
    pub origin_date: NaiveDate,
    pub status: ObligationStatus,
    pub completed_at: Option<DateTime<Utc>>,
    /// Completed by the overdue pass rather than by the learner.
    pub system_advanced: bool,
    pub is_mastered: bool,
    pub mastered_at: Option<DateTime<Utc>>,
}

impl ReviewObligation {
    /// Days past the scheduled date; negative when not yet due.
    pub fn overdue_days(&self, today: NaiveDate) -> i64 {
        (today - self.scheduled_date).num_days()
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == ObligationStatus::Pending && self.scheduled_date <= today
    }

    /// Where the overdue pass would move this obligation on `today`.
    ///
    /// `Some((next_index, scheduled_date))` once the obligation is overdue by
    /// at least the gap to the next interval. The final review never moves.
    pub fn upgrade_target(&self, today: NaiveDate) -> Option<(u32, NaiveDate)> {
        if self.status != ObligationStatus::Pending || self.review_index >= FINAL_INDEX {
            return None;
        }
        let overdue = self.overdue_days(today);
        if overdue <= 0 {
            return None;
        }
        let idx = self.review_index as usize;
        let gap_to_next = INTERVALS[idx + 1] - INTERVALS[idx];
        if overdue < gap_to_next {
            return None;
        }
        let next = self.review_index + 1;
        let anchored = scheduled_for(self.origin_date, next)?;
        Some((next, anchored.max(today)))
    }
}

/// Created once per chain when the final review completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub id: i64,
    pub user_id: UserId,
    pub submission_id: SubmissionId,
    pub origin_date: NaiveDate,
    pub mastered_date: NaiveDate,
    pub total_days_to_master: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryStats {
    pub mastered: u32,
    pub pending: u32,
    pub due_today: u32,
    /// Percentage with one decimal place.
    pub mastery_rate: f64,
}

impl MasteryStats {
    pub fn new(mastered: u32, pending: u32, due_today: u32) -> Self {
        let denominator = f64::from((mastered + pending).max(1));
        let rate = f64::from(mastered) / denominator * 100.0;
        Self {
            mastered,
            pending,
            due_today,
            mastery_rate: (rate * 10.0).round() / 10.0,
        }
    }
}

/// Outcome of completing a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Completion {
    Advanced {
        completed: ReviewObligation,
        next: ReviewObligation,
    },
    Mastered {
        completed: ReviewObligation,
        record: MasteryRecord,
    },
}

impl Completion {
    pub fn completed(&self) -> &ReviewObligation {
        match self {
            Completion::Advanced { completed, .. } | Completion::Mastered { completed, .. } => {
                completed
            }
        }
    }
}

/// Counters from one daily generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub users: u32,
    pub enrolled: u32,
    pub upgraded: u32,
    pub failed: u32,
}

/// Counters from one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSummary {
    pub notified: u32,
    pub failed: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pending(index: u32, origin: NaiveDate) -> ReviewObligation {
        ReviewObligation {
            id: 1,
            user_id: 1,
            submission_id: 1,
            review_index: index,
            scheduled_date: scheduled_for(origin, index).unwrap(),
            origin_date: origin,
            status: ObligationStatus::Pending,
            completed_at: None,
            system_advanced: false,
            is_mastered: false,
            mastered_at: None,
        }
    }

    #[test]
    fn schedule_is_anchored_on_origin() {
        let origin = day(2024, 1, 1);
        assert_eq!(scheduled_for(origin, 0), Some(day(2024, 1, 2)));
        assert_eq!(scheduled_for(origin, 4), Some(day(2024, 1, 31)));
        assert_eq!(scheduled_for(origin, 5), None);
    }

    #[test]
    fn upgrade_needs_full_gap() {
        let origin = day(2024, 1, 1);
        let ob = pending(1, origin); // due Jan 4
        // Gap to index 2 is 4 days.
        assert_eq!(ob.upgrade_target(day(2024, 1, 7)), None);
        assert_eq!(ob.upgrade_target(day(2024, 1, 8)), Some((2, day(2024, 1, 8))));
        assert_eq!(ob.upgrade_target(day(2024, 1, 11)), Some((2, day(2024, 1, 11))));
    }

    #[test]
    fn upgrade_prefers_anchored_date_when_later() {
        let origin = day(2024, 1, 1);
        let ob = pending(0, origin); // due Jan 2, gap to next is 2
        assert_eq!(ob.upgrade_target(day(2024, 1, 4)), Some((1, day(2024, 1, 4))));
        let mut early = pending(0, origin);
        early.scheduled_date = day(2023, 12, 20);
        assert_eq!(early.upgrade_target(day(2023, 12, 30)), Some((1, day(2024, 1, 4))));
    }

    #[test]
    fn final_review_never_upgrades() {
        let ob = pending(FINAL_INDEX, day(2024, 1, 1));
        assert_eq!(ob.upgrade_target(day(2025, 1, 1)), None);
    }

    #[test]
    fn mastery_rate_rounds_to_one_decimal() {
        assert_eq!(MasteryStats::new(1, 2, 0).mastery_rate, 33.3);
        assert_eq!(MasteryStats::new(0, 0, 0).mastery_rate, 0.0);
        assert_eq!(MasteryStats::new(2, 0, 0).mastery_rate, 100.0);
    }
}
