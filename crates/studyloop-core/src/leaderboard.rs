//! Period leaderboards over the point ledger.
//!
//! Totals cover active students only. A student with no grants in the period
//! still appears with a total of 0. Ranking is competition style:
//! `rank = 1 + (students with a strictly greater total)`, so tied students
//! share a rank and are listed by ascending `user_id`.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::points::quarter_of;
use crate::storage::{Database, MAX_LEADERBOARD_LIMIT};
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Month,
    Quarter,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Month => "month",
            PeriodKind::Quarter => "quarter",
        }
    }

    fn max_value(&self) -> u32 {
        match self {
            PeriodKind::Month => 12,
            PeriodKind::Quarter => 4,
        }
    }

    /// Ledger column this period filters on.
    fn column(&self) -> &'static str {
        match self {
            PeriodKind::Month => "month",
            PeriodKind::Quarter => "quarter",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "month" => Ok(PeriodKind::Month),
            "quarter" => Ok(PeriodKind::Quarter),
            other => Err(ValidationError::InvalidValue {
                field: "period".into(),
                message: format!("expected 'month' or 'quarter', got '{other}'"),
            }),
        }
    }
}

/// A validated calendar month or quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub kind: PeriodKind,
    pub year: i32,
    pub value: u32,
}

impl Period {
    pub fn new(kind: PeriodKind, year: i32, value: u32) -> std::result::Result<Self, ValidationError> {
        let max = kind.max_value();
        if !(1..=max).contains(&value) {
            return Err(ValidationError::InvalidPeriod {
                kind: kind.as_str(),
                value,
                max,
            });
        }
        Ok(Self { kind, year, value })
    }

    /// The period of `kind` that contains `date`.
    pub fn containing(kind: PeriodKind, date: NaiveDate) -> Self {
        let value = match kind {
            PeriodKind::Month => date.month(),
            PeriodKind::Quarter => quarter_of(date),
        };
        Self {
            kind,
            year: date.year(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub total_points: u64,
    pub rank: u32,
}

pub struct Leaderboard {
    db: Database,
}

impl Leaderboard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Top `limit` students for `period`, best first.
    ///
    /// Ranks are competition ranks and agree with [`Leaderboard::rank_of`]:
    /// totals of 30, 30, 20 rank 1, 1, 3 (not dense 1, 1, 2).
    ///
    /// `limit` is capped at 500.
    pub fn rank(&self, period: Period, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        if limit == 0 {
            return Err(ValidationError::InvalidValue {
                field: "limit".into(),
                message: "must be at least 1".into(),
            }
            .into());
        }
        let limit = limit.min(MAX_LEADERBOARD_LIMIT);
        let sql = format!(
            "SELECT u.user_id, COALESCE(SUM(s.value), 0) AS total
             FROM users u
             LEFT JOIN score_grants s
                ON s.user_id = u.user_id AND s.year = ?1 AND s.{col} = ?2
             WHERE u.role = 'student' AND u.is_active = 1
             GROUP BY u.user_id
             ORDER BY total DESC, u.user_id ASC
             LIMIT ?3",
            col = period.kind.column()
        );

        let rows = self.db.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![period.year, period.value, limit], |row| {
                    Ok((row.get::<_, UserId>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(assign_ranks(rows))
    }

    /// Rank of a single student, whether or not they fall inside a `rank` window.
    ///
    /// `None` if the user is not an active student.
    pub fn rank_of(&self, user_id: UserId, period: Period) -> Result<Option<LeaderboardEntry>> {
        let sql = format!(
            "WITH totals AS (
                SELECT u.user_id, COALESCE(SUM(s.value), 0) AS total
                FROM users u
                LEFT JOIN score_grants s
                    ON s.user_id = u.user_id AND s.year = ?1 AND s.{col} = ?2
                WHERE u.role = 'student' AND u.is_active = 1
                GROUP BY u.user_id
             )
             SELECT t.total, (SELECT COUNT(*) FROM totals o WHERE o.total > t.total)
             FROM totals t WHERE t.user_id = ?3",
            col = period.kind.column()
        );

        self.db.read(|conn| {
            let found = conn
                .query_row(&sql, params![period.year, period.value, user_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?))
                })
                .optional()?;
            Ok(found.map(|(total, ahead)| LeaderboardEntry {
                user_id,
                total_points: total.max(0) as u64,
                rank: ahead + 1,
            }))
        })
    }
}

/// Competition ranks over rows already sorted by total descending.
fn assign_ranks(rows: Vec<(UserId, i64)>) -> Vec<LeaderboardEntry> {
    let mut entries = Vec::with_capacity(rows.len());
    let mut rank = 0u32;
    let mut previous: Option<i64> = None;
    for (position, (user_id, total)) in rows.into_iter().enumerate() {
        if previous != Some(total) {
            rank = position as u32 + 1;
            previous = Some(total);
        }
        entries.push(LeaderboardEntry {
            user_id,
            total_points: total.max(0) as u64,
            rank,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::{grant_fixed_in, ScoreKind};
    use crate::users::{Role, UserDirectory};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed() -> Database {
        let db = Database::open_memory().unwrap();
        let users = UserDirectory::new(db.clone());
        for id in [1, 2, 3, 4] {
            users.register_user(id, Role::Student).unwrap();
        }
        users.register_user(9, Role::Teacher).unwrap();
        db.transaction(|conn| {
            // user 3: 5, user 2: 5, user 1: 2 in March; user 4: nothing.
            grant_fixed_in(conn, 3, ScoreKind::ExcellentGrade, day(2024, 3, 2), Some(30))?;
            grant_fixed_in(conn, 2, ScoreKind::ExcellentGrade, day(2024, 3, 9), Some(20))?;
            grant_fixed_in(conn, 1, ScoreKind::GoodGrade, day(2024, 3, 9), Some(10))?;
            // April falls in Q2.
            grant_fixed_in(conn, 1, ScoreKind::ExcellentGrade, day(2024, 4, 1), Some(11))?;
            grant_fixed_in(conn, 9, ScoreKind::ExcellentGrade, day(2024, 3, 9), Some(90))?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn ties_share_rank_and_order_by_user_id() {
        let board = Leaderboard::new(seed());
        let period = Period::new(PeriodKind::Month, 2024, 3).unwrap();
        let entries = board.rank(period, 10).unwrap();
        let view: Vec<_> = entries
            .iter()
            .map(|e| (e.user_id, e.total_points, e.rank))
            .collect();
        assert_eq!(view, vec![(2, 5, 1), (3, 5, 1), (1, 2, 3), (4, 0, 4)]);
        assert_eq!(board.rank(period, 10).unwrap(), entries);
    }

    #[test]
    fn rank_of_matches_window_and_handles_outsiders() {
        let board = Leaderboard::new(seed());
        let period = Period::new(PeriodKind::Month, 2024, 3).unwrap();
        let top = board.rank(period, 1).unwrap();
        assert_eq!(top.len(), 1);

        let user1 = board.rank_of(1, period).unwrap().unwrap();
        assert_eq!(user1.rank, 3);
        assert_eq!(board.rank_of(4, period).unwrap().unwrap().rank, 4);
        // Staff never rank.
        assert!(board.rank_of(9, period).unwrap().is_none());
    }

    #[test]
    fn board_ranks_agree_with_rank_of() {
        let board = Leaderboard::new(seed());
        let period = Period::new(PeriodKind::Month, 2024, 3).unwrap();
        for entry in board.rank(period, 10).unwrap() {
            assert_eq!(board.rank_of(entry.user_id, period).unwrap(), Some(entry));
        }
    }

    #[test]
    fn quarter_period_sums_its_months() {
        let board = Leaderboard::new(seed());
        let q2 = Period::new(PeriodKind::Quarter, 2024, 2).unwrap();
        let entries = board.rank(q2, 10).unwrap();
        assert_eq!(entries[0].user_id, 1);
        assert_eq!(entries[0].total_points, 5);
        assert!(entries[1..].iter().all(|e| e.total_points == 0 && e.rank == 2));
    }

    #[test]
    fn inactive_students_drop_out() {
        let db = seed();
        UserDirectory::new(db.clone()).set_active(2, false).unwrap();
        let board = Leaderboard::new(db);
        let period = Period::new(PeriodKind::Month, 2024, 3).unwrap();
        let ids: Vec<_> = board.rank(period, 10).unwrap().iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![3, 1, 4]);
    }

    #[test]
    fn period_validation() {
        assert!(Period::new(PeriodKind::Month, 2024, 13).is_err());
        assert!(Period::new(PeriodKind::Quarter, 2024, 0).is_err());
        assert!(Period::new(PeriodKind::Quarter, 2024, 4).is_ok());
        assert_eq!(
            Period::containing(PeriodKind::Quarter, day(2024, 8, 1)).value,
            3
        );
    }

    #[test]
    fn zero_limit_is_rejected() {
        let board = Leaderboard::new(seed());
        let period = Period::new(PeriodKind::Month, 2024, 3).unwrap();
        assert!(board.rank(period, 0).is_err());
    }
}
