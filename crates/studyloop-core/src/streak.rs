//! Consecutive-day streak tracking.
//!
//! The streak only moves on the first counted activity of a day. Gaps are
//! classified against the previous activity date:
//!
//! ```text
//! gap 0            -> no-op
//! gap 1            -> +1
//! Fri/Sat -> Mon   -> +1   (weekend bridge)
//! any other gap    -> reset to 1
//! negative gap     -> InvalidDateOrder, state untouched
//! ```
//!
//! Reaching a tier in [`BONUS_TIERS`] grants a one-off bonus for that day.
//! Tiers are per occurrence: climbing back to a tier after a reset earns it again.

use chrono::{Datelike, NaiveDate, Weekday};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreakError};
use crate::points::{self, ScoreGrant, ScoreKind};
use crate::storage::Database;
use crate::UserId;

/// Streak length, bonus points, description.
pub const BONUS_TIERS: [(u32, u32, &str); 6] = [
    (3, 1, "3-day streak"),
    (7, 3, "One week streak"),
    (15, 10, "Half-month streak"),
    (30, 50, "One month streak"),
    (60, 150, "Two month streak"),
    (100, 300, "100-day streak"),
];

/// Bonus points and description for reaching exactly `streak` days.
pub fn bonus_for(streak: u32) -> Option<(u32, &'static str)> {
    BONUS_TIERS
        .iter()
        .find(|(days, _, _)| *days == streak)
        .map(|(_, points, description)| (*points, *description))
}

/// How a new activity date relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    SameDay,
    NextDay,
    WeekendBridge,
    Reset,
    OutOfOrder,
}

pub fn classify_gap(last: NaiveDate, date: NaiveDate) -> GapClass {
    let gap = (date - last).num_days();
    match gap {
        g if g < 0 => GapClass::OutOfOrder,
        0 => GapClass::SameDay,
        1 => GapClass::NextDay,
        2 | 3 if bridges_weekend(last, date) => GapClass::WeekendBridge,
        _ => GapClass::Reset,
    }
}

/// Friday or Saturday followed by the next Monday.
fn bridges_weekend(last: NaiveDate, date: NaiveDate) -> bool {
    if date.weekday() != Weekday::Mon {
        return false;
    }
    match (last.weekday(), (date - last).num_days()) {
        (Weekday::Sat, 2) | (Weekday::Fri, 3) => true,
        _ => false,
    }
}

/// Per-user streak summary. `best_streak >= current_streak` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

impl StreakState {
    /// Apply an activity on `date`.
    ///
    /// # Errors
    /// `InvalidDateOrder` if `date` precedes the last activity; state is left untouched.
    pub fn apply(&mut self, date: NaiveDate) -> std::result::Result<GapClass, StreakError> {
        let class = match self.last_activity_date {
            None => {
                self.current_streak = 1;
                GapClass::Reset
            }
            Some(last) => {
                let class = classify_gap(last, date);
                match class {
                    GapClass::OutOfOrder => {
                        return Err(StreakError::InvalidDateOrder { last, date });
                    }
                    GapClass::SameDay => return Ok(class),
                    GapClass::NextDay | GapClass::WeekendBridge => self.current_streak += 1,
                    GapClass::Reset => self.current_streak = 1,
                }
                class
            }
        };
        self.best_streak = self.best_streak.max(self.current_streak);
        self.last_activity_date = Some(date);
        Ok(class)
    }
}

/// Result of [`StreakTracker::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakAdvance {
    pub current_streak: u32,
    pub best_streak: u32,
    /// Bonus points granted by this advance, if a tier was reached.
    pub bonus_granted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_description: Option<String>,
}

pub(crate) fn load_state_in(conn: &Connection, user_id: UserId) -> Result<StreakState> {
    let state = conn
        .query_row(
            "SELECT current_streak, best_streak, last_activity_date
             FROM streak_states WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(StreakState {
                    current_streak: row.get(0)?,
                    best_streak: row.get(1)?,
                    last_activity_date: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(state.unwrap_or_default())
}

fn save_state_in(conn: &Connection, user_id: UserId, state: &StreakState) -> Result<()> {
    conn.execute(
        "INSERT INTO streak_states (user_id, current_streak, best_streak, last_activity_date)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            current_streak = excluded.current_streak,
            best_streak = excluded.best_streak,
            last_activity_date = excluded.last_activity_date",
        params![
            user_id,
            state.current_streak,
            state.best_streak,
            state.last_activity_date
        ],
    )?;
    Ok(())
}

/// Advance the streak inside an open transaction.
pub(crate) fn advance_in(conn: &Connection, user_id: UserId, date: NaiveDate) -> Result<StreakAdvance> {
    let mut state = load_state_in(conn, user_id)?;
    let class = state.apply(date)?;
    if class == GapClass::SameDay {
        return Ok(StreakAdvance {
            current_streak: state.current_streak,
            best_streak: state.best_streak,
            bonus_granted: None,
            bonus_description: None,
        });
    }
    save_state_in(conn, user_id, &state)?;
    tracing::debug!(
        user_id,
        ?class,
        current = state.current_streak,
        best = state.best_streak,
        "streak advanced"
    );

    let bonus = grant_tier_bonus_in(conn, user_id, state.current_streak, date)?;
    Ok(StreakAdvance {
        current_streak: state.current_streak,
        best_streak: state.best_streak,
        bonus_granted: bonus.as_ref().map(|g| g.value),
        bonus_description: bonus.map(|g| g.description),
    })
}

fn grant_tier_bonus_in(
    conn: &Connection,
    user_id: UserId,
    streak: u32,
    date: NaiveDate,
) -> Result<Option<ScoreGrant>> {
    let Some((value, description)) = bonus_for(streak) else {
        return Ok(None);
    };
    if points::has_streak_bonus_in(conn, user_id, value, date)? {
        return Ok(None);
    }
    points::insert_grant_in(conn, user_id, ScoreKind::StreakBonus, value, description, date, None)
}

/// Owner of [`StreakState`] rows.
pub struct StreakTracker {
    db: Database,
}

impl StreakTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Advance `user_id`'s streak for an activity on `date` in its own transaction.
    pub fn advance(&self, user_id: UserId, date: NaiveDate) -> Result<StreakAdvance> {
        self.db.transaction(|conn| advance_in(conn, user_id, date))
    }

    pub fn state(&self, user_id: UserId) -> Result<StreakState> {
        self.db.read(|conn| load_state_in(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::points::ScoreLedger;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2024-01-05 is a Friday.
    const FRI: (i32, u32, u32) = (2024, 1, 5);

    #[test]
    fn gap_classification() {
        let fri = day(FRI.0, FRI.1, FRI.2);
        let sat = day(2024, 1, 6);
        let mon = day(2024, 1, 8);
        let wed = day(2024, 1, 3);
        assert_eq!(classify_gap(fri, fri), GapClass::SameDay);
        assert_eq!(classify_gap(fri, sat), GapClass::NextDay);
        assert_eq!(classify_gap(fri, mon), GapClass::WeekendBridge);
        assert_eq!(classify_gap(sat, mon), GapClass::WeekendBridge);
        assert_eq!(classify_gap(wed, fri), GapClass::Reset);
        assert_eq!(classify_gap(mon, fri), GapClass::OutOfOrder);
        // Thursday to Monday skips a weekday too.
        assert_eq!(classify_gap(day(2024, 1, 4), mon), GapClass::Reset);
        // Sunday to Tuesday is not a weekend bridge.
        assert_eq!(classify_gap(day(2024, 1, 7), day(2024, 1, 9)), GapClass::Reset);
    }

    #[test]
    fn friday_to_monday_keeps_streak() {
        let mut state = StreakState::default();
        state.apply(day(2024, 1, 4)).unwrap();
        state.apply(day(2024, 1, 5)).unwrap();
        state.apply(day(2024, 1, 8)).unwrap();
        assert_eq!(state.current_streak, 3);
    }

    #[test]
    fn wednesday_to_friday_resets() {
        let mut state = StreakState::default();
        state.apply(day(2024, 1, 2)).unwrap();
        state.apply(day(2024, 1, 3)).unwrap();
        state.apply(day(2024, 1, 5)).unwrap();
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.best_streak, 2);
    }

    #[test]
    fn out_of_order_leaves_state_untouched() {
        let mut state = StreakState::default();
        state.apply(day(2024, 1, 10)).unwrap();
        let before = state;
        let err = state.apply(day(2024, 1, 9)).unwrap_err();
        assert_eq!(
            err,
            StreakError::InvalidDateOrder {
                last: day(2024, 1, 10),
                date: day(2024, 1, 9)
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn tracker_persists_and_rejects_backwards_dates() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(db);
        tracker.advance(1, day(2024, 2, 1)).unwrap();
        tracker.advance(1, day(2024, 2, 2)).unwrap();
        let err = tracker.advance(1, day(2024, 1, 30)).unwrap_err();
        assert!(matches!(err, CoreError::Streak(StreakError::InvalidDateOrder { .. })));
        let state = tracker.state(1).unwrap();
        assert_eq!(state.current_streak, 2);
        assert_eq!(state.last_activity_date, Some(day(2024, 2, 2)));
    }

    #[test]
    fn same_day_advance_is_noop() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(db);
        tracker.advance(1, day(2024, 2, 1)).unwrap();
        let again = tracker.advance(1, day(2024, 2, 1)).unwrap();
        assert_eq!(again.current_streak, 1);
        assert_eq!(again.bonus_granted, None);
    }

    #[test]
    fn third_day_grants_one_point_bonus_once() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(db.clone());
        tracker.advance(1, day(2024, 3, 4)).unwrap();
        tracker.advance(1, day(2024, 3, 5)).unwrap();
        let third = tracker.advance(1, day(2024, 3, 6)).unwrap();
        assert_eq!(third.current_streak, 3);
        assert_eq!(third.bonus_granted, Some(1));

        let bonuses = ScoreLedger::new(db)
            .grants_of_kind(1, ScoreKind::StreakBonus)
            .unwrap();
        assert_eq!(bonuses.len(), 1);
        assert_eq!(bonuses[0].value, 1);
    }

    #[test]
    fn tier_is_earned_again_after_reset() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(db.clone());
        // Mon..Wed: reaches 3.
        for d in 1..=3 {
            tracker.advance(1, day(2024, 4, d)).unwrap();
        }
        // Gap of a week, then Mon..Wed again.
        for d in 15..=17 {
            tracker.advance(1, day(2024, 4, d)).unwrap();
        }
        let bonuses = ScoreLedger::new(db)
            .grants_of_kind(1, ScoreKind::StreakBonus)
            .unwrap();
        assert_eq!(bonuses.len(), 2);
        assert!(bonuses.iter().all(|b| b.value == 1));
    }

    #[test]
    fn bonus_tier_lookup() {
        assert_eq!(bonus_for(3).map(|b| b.0), Some(1));
        assert_eq!(bonus_for(7).map(|b| b.0), Some(3));
        assert_eq!(bonus_for(15).map(|b| b.0), Some(10));
        assert_eq!(bonus_for(30).map(|b| b.0), Some(50));
        assert_eq!(bonus_for(60).map(|b| b.0), Some(150));
        assert_eq!(bonus_for(100).map(|b| b.0), Some(300));
        assert_eq!(bonus_for(4), None);
    }

    proptest! {
        #[test]
        fn best_never_below_current(steps in proptest::collection::vec(-3i64..6, 1..60)) {
            let mut state = StreakState::default();
            let mut date = day(2024, 1, 1);
            for step in steps {
                date += chrono::Duration::days(step);
                let _ = state.apply(date);
                prop_assert!(state.best_streak >= state.current_streak);
                // Undo a rejected backwards step so later dates stay meaningful.
                if let Some(last) = state.last_activity_date {
                    if date < last {
                        date = last;
                    }
                }
            }
        }
    }
}
