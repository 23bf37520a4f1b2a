//! Activity ledger.
//!
//! Append-only record of dated user actions. The first event of a calendar day
//! is stored with `counted = 1` and drives the streak; later events that day are
//! stored with `counted = 0` for the audit trail only. "First of the day" is
//! decided by a partial unique index, not by a read-then-write check, so two
//! racing writers cannot both advance the streak.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DatabaseError, Result, StreakError, ValidationError};
use crate::points::{self, ScoreGrant, ScoreKind};
use crate::storage::{parse_column, Database};
use crate::streak::{self, StreakAdvance};
use crate::users;
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TaskView,
    Submission,
    ReviewComplete,
    CollectionView,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::TaskView => "task_view",
            ActivityKind::Submission => "submission",
            ActivityKind::ReviewComplete => "review_complete",
            ActivityKind::CollectionView => "collection_view",
        }
    }

    /// Base point grant for a newly recorded event of this kind.
    fn base_grant(&self) -> Option<ScoreKind> {
        match self {
            ActivityKind::Submission => Some(ScoreKind::Submission),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "task_view" => Ok(ActivityKind::TaskView),
            "submission" => Ok(ActivityKind::Submission),
            "review_complete" => Ok(ActivityKind::ReviewComplete),
            "collection_view" => Ok(ActivityKind::CollectionView),
            other => Err(ValidationError::UnknownActivityKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEvent {
    pub id: i64,
    pub user_id: UserId,
    pub activity_date: NaiveDate,
    pub activity_kind: ActivityKind,
    /// Whether this event was the day's streak-driving event.
    pub counted: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Result of [`ActivityLedger::record_activity`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordOutcome {
    /// True only for the first event of the user's day.
    pub created: bool,
    /// Streak after the advance; `None` when nothing advanced.
    pub streak: Option<StreakAdvance>,
    /// Base point grant, if this event earned one.
    pub grant: Option<ScoreGrant>,
}

/// One day of the check-in chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartDay {
    pub date: NaiveDate,
    pub checked: bool,
    /// 0 = Monday.
    pub weekday: u32,
    pub is_today: bool,
}

const INSERT_EVENT: &str = "INSERT INTO activity_events
    (user_id, activity_date, activity_kind, counted, recorded_at)
    VALUES (?1, ?2, ?3, 1, ?4)";

const INSERT_UNCOUNTED_EVENT: &str = "INSERT OR IGNORE INTO activity_events
    (user_id, activity_date, activity_kind, counted, recorded_at)
    VALUES (?1, ?2, ?3, 0, ?4)";

/// Record an activity inside an open transaction.
pub(crate) fn record_in(
    conn: &Connection,
    user_id: UserId,
    kind: ActivityKind,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RecordOutcome> {
    users::ensure_user_in(conn, user_id, now)?;

    let (counted, inserted) = match conn.execute(
        INSERT_EVENT,
        params![user_id, date, kind.as_str(), now],
    ) {
        Ok(_) => (true, true),
        Err(e) => match DatabaseError::from(e) {
            DatabaseError::UniqueViolation(_) => {
                let inserted = conn.execute(
                    INSERT_UNCOUNTED_EVENT,
                    params![user_id, date, kind.as_str(), now],
                )? > 0;
                (false, inserted)
            }
            other => return Err(other.into()),
        },
    };

    let mut outcome = RecordOutcome {
        created: counted,
        ..RecordOutcome::default()
    };

    if counted {
        match streak::advance_in(conn, user_id, date) {
            Ok(advance) => outcome.streak = Some(advance),
            Err(CoreError::Streak(StreakError::InvalidDateOrder { last, date })) => {
                tracing::warn!(
                    user_id,
                    %last,
                    %date,
                    "activity predates last streak day; event kept, streak untouched"
                );
            }
            Err(e) => return Err(e),
        }
    }

    if inserted {
        if let Some(grant_kind) = kind.base_grant() {
            outcome.grant = points::grant_fixed_in(conn, user_id, grant_kind, date, None)?;
        }
    }

    tracing::debug!(
        user_id,
        kind = kind.as_str(),
        %date,
        counted,
        inserted,
        "activity recorded"
    );
    Ok(outcome)
}

/// Days in `[from, to]` with a counted event.
fn counted_days_in(
    conn: &Connection,
    user_id: UserId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let mut stmt = conn.prepare(
        "SELECT activity_date FROM activity_events
         WHERE user_id = ?1 AND counted = 1 AND activity_date BETWEEN ?2 AND ?3
         ORDER BY activity_date",
    )?;
    let days = stmt
        .query_map(params![user_id, from, to], |row| row.get::<_, NaiveDate>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(days)
}

pub(crate) fn week_checkins_in(conn: &Connection, user_id: UserId, today: NaiveDate) -> Result<u32> {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    Ok(counted_days_in(conn, user_id, monday, today)?.len() as u32)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityEvent> {
    Ok(ActivityEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        activity_date: row.get(2)?,
        activity_kind: parse_column(row, 3)?,
        counted: row.get(4)?,
        recorded_at: row.get(5)?,
    })
}

pub struct ActivityLedger {
    db: Database,
}

impl ActivityLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record one user action on `date`.
    ///
    /// Idempotent per (user, day): repeated calls return `created = false` and
    /// leave streak and bonus state alone. A concurrent duplicate is reported
    /// the same way rather than as an error.
    pub fn record_activity(
        &self,
        user_id: UserId,
        kind: ActivityKind,
        date: NaiveDate,
    ) -> Result<RecordOutcome> {
        self.db
            .transaction(|conn| record_in(conn, user_id, kind, date, Utc::now()))
    }

    /// Events in `[from, to]`, oldest first.
    pub fn events_for(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActivityEvent>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, activity_date, activity_kind, counted, recorded_at
                 FROM activity_events
                 WHERE user_id = ?1 AND activity_date BETWEEN ?2 AND ?3
                 ORDER BY activity_date, id",
            )?;
            let events = stmt
                .query_map(params![user_id, from, to], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }

    /// One row per day for the `days` days ending at `today`.
    pub fn checkin_chart(&self, user_id: UserId, today: NaiveDate, days: u32) -> Result<Vec<ChartDay>> {
        let days = days.max(1);
        let start = today - Duration::days(i64::from(days) - 1);
        let checked = self.db.read(|conn| counted_days_in(conn, user_id, start, today))?;

        Ok(start
            .iter_days()
            .take(days as usize)
            .map(|date| ChartDay {
                date,
                checked: checked.binary_search(&date).is_ok(),
                weekday: date.weekday().num_days_from_monday(),
                is_today: date == today,
            })
            .collect())
    }

    /// Days with a counted event since Monday of `today`'s week.
    pub fn week_checkins(&self, user_id: UserId, today: NaiveDate) -> Result<u32> {
        self.db.read(|conn| week_checkins_in(conn, user_id, today))
    }
}
