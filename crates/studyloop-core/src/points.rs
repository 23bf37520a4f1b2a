//! Point ledger.
//!
//! Grants are append-only rows. Every grant's value comes from a static rule
//! table keyed by [`ScoreKind`]; streak bonuses take theirs from the tier table
//! in [`crate::streak`]. Period columns (`year`, `month`, `quarter`) are derived
//! from the grant date at insert time so leaderboards can filter on them.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::storage::{parse_column, Database};
use crate::{SubmissionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Submission,
    GoodGrade,
    ExcellentGrade,
    StreakBonus,
    ReviewComplete,
}

impl ScoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreKind::Submission => "submission",
            ScoreKind::GoodGrade => "good_grade",
            ScoreKind::ExcellentGrade => "excellent_grade",
            ScoreKind::StreakBonus => "streak_bonus",
            ScoreKind::ReviewComplete => "review_complete",
        }
    }

    /// Fixed point value for this kind.
    ///
    /// `None` for streak bonuses, whose value depends on the tier reached.
    pub fn fixed_value(&self) -> Option<u32> {
        match self {
            ScoreKind::Submission => Some(1),
            ScoreKind::GoodGrade => Some(2),
            ScoreKind::ExcellentGrade => Some(5),
            ScoreKind::ReviewComplete => Some(1),
            ScoreKind::StreakBonus => None,
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            ScoreKind::Submission => "Homework submitted",
            ScoreKind::GoodGrade => "Graded good",
            ScoreKind::ExcellentGrade => "Graded excellent",
            ScoreKind::StreakBonus => "Streak bonus",
            ScoreKind::ReviewComplete => "Review completed",
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submission" => Ok(ScoreKind::Submission),
            "good_grade" => Ok(ScoreKind::GoodGrade),
            "excellent_grade" => Ok(ScoreKind::ExcellentGrade),
            "streak_bonus" => Ok(ScoreKind::StreakBonus),
            "review_complete" => Ok(ScoreKind::ReviewComplete),
            other => Err(ValidationError::InvalidValue {
                field: "score_kind".into(),
                message: format!("unknown score kind '{other}'"),
            }),
        }
    }
}

/// Calendar quarter (1..=4) of a date.
pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// One immutable point grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreGrant {
    pub id: i64,
    pub user_id: UserId,
    pub kind: ScoreKind,
    pub value: u32,
    pub description: String,
    pub granted_on: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
    pub submission_id: Option<SubmissionId>,
}

/// Point totals for one user, relative to a reference day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PointTotals {
    pub total: u64,
    pub month: u64,
    pub quarter: u64,
}

/// Insert a grant row and return it.
///
/// Returns `None` when a storage uniqueness rule swallowed the insert
/// (a grade grant already recorded for the same submission).
pub(crate) fn insert_grant_in(
    conn: &Connection,
    user_id: UserId,
    kind: ScoreKind,
    value: u32,
    description: &str,
    granted_on: NaiveDate,
    submission_id: Option<SubmissionId>,
) -> Result<Option<ScoreGrant>> {
    let year = granted_on.year();
    let month = granted_on.month();
    let quarter = quarter_of(granted_on);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO score_grants
            (user_id, kind, value, description, granted_on, year, month, quarter, submission_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user_id,
            kind.as_str(),
            value,
            description,
            granted_on,
            year,
            month,
            quarter,
            submission_id
        ],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    tracing::debug!(user_id, kind = kind.as_str(), value, "score granted");
    Ok(Some(ScoreGrant {
        id: conn.last_insert_rowid(),
        user_id,
        kind,
        value,
        description: description.to_string(),
        granted_on,
        year,
        month,
        quarter,
        submission_id,
    }))
}

/// Grant a fixed-value kind using its rule-table value and description.
pub(crate) fn grant_fixed_in(
    conn: &Connection,
    user_id: UserId,
    kind: ScoreKind,
    granted_on: NaiveDate,
    submission_id: Option<SubmissionId>,
) -> Result<Option<ScoreGrant>> {
    let Some(value) = kind.fixed_value() else {
        return Err(ValidationError::InvalidValue {
            field: "score_kind".into(),
            message: format!("{kind} has no fixed value"),
        }
        .into());
    };
    insert_grant_in(
        conn,
        user_id,
        kind,
        value,
        kind.default_description(),
        granted_on,
        submission_id,
    )
}

/// Whether a streak bonus of exactly `value` points was already granted on `date`.
pub(crate) fn has_streak_bonus_in(
    conn: &Connection,
    user_id: UserId,
    value: u32,
    date: NaiveDate,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM score_grants
            WHERE user_id = ?1 AND kind = 'streak_bonus' AND value = ?2 AND granted_on = ?3
         )",
        params![user_id, value, date],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreGrant> {
    Ok(ScoreGrant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_column(row, 2)?,
        value: row.get(3)?,
        description: row.get(4)?,
        granted_on: row.get(5)?,
        year: row.get(6)?,
        month: row.get(7)?,
        quarter: row.get(8)?,
        submission_id: row.get(9)?,
    })
}

/// Read side of the point ledger.
pub struct ScoreLedger {
    db: Database,
}

impl ScoreLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recent grants first.
    pub fn history(&self, user_id: UserId, limit: u32) -> Result<Vec<ScoreGrant>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, value, description, granted_on,
                        year, month, quarter, submission_id
                 FROM score_grants
                 WHERE user_id = ?1
                 ORDER BY granted_on DESC, id DESC
                 LIMIT ?2",
            )?;
            let grants = stmt
                .query_map(params![user_id, limit], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
    }

    /// Grants of one kind, oldest first.
    pub fn grants_of_kind(&self, user_id: UserId, kind: ScoreKind) -> Result<Vec<ScoreGrant>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, value, description, granted_on,
                        year, month, quarter, submission_id
                 FROM score_grants
                 WHERE user_id = ?1 AND kind = ?2
                 ORDER BY granted_on, id",
            )?;
            let grants = stmt
                .query_map(params![user_id, kind.as_str()], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
    }

    /// All-time, month-to-date and quarter-to-date totals relative to `today`.
    pub fn totals(&self, user_id: UserId, today: NaiveDate) -> Result<PointTotals> {
        self.db.read(|conn| totals_in(conn, user_id, today))
    }
}

pub(crate) fn totals_in(conn: &Connection, user_id: UserId, today: NaiveDate) -> Result<PointTotals> {
    let (total, month, quarter): (i64, i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(value), 0),
            COALESCE(SUM(CASE WHEN year = ?2 AND month = ?3 THEN value END), 0),
            COALESCE(SUM(CASE WHEN year = ?2 AND quarter = ?4 THEN value END), 0)
         FROM score_grants WHERE user_id = ?1",
        params![user_id, today.year(), today.month(), quarter_of(today)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(PointTotals {
        total: total.max(0) as u64,
        month: month.max(0) as u64,
        quarter: quarter.max(0) as u64,
    })
}
