//! # studyloop Core Library
//!
//! This library tracks a learner's daily study activity and derives three
//! subsystems from it: a consecutive-day streak with tiered bonus points, an
//! Ebbinghaus spaced-review scheduler, and period leaderboards over the point
//! ledger. The `studyloop` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Activity ledger**: dated activity events, at most one *counted* event
//!   per user per day, enforced by a storage-level uniqueness constraint
//! - **Streak tracker**: consecutive-day counting with a narrow Fri/Sat to
//!   Monday weekend tolerance, plus tiered bonus grants
//! - **Review scheduler**: the obligation state machine over the fixed
//!   interval sequence `[1, 3, 7, 15, 30]`
//! - **Leaderboard**: month/quarter rankings with deterministic tie-breaks
//! - **Periodic runner**: hourly wake-ups driving the daily generation pass
//!   and reminder checks
//!
//! ## Key Components
//!
//! - [`StudyCore`]: inbound events and outbound queries in one place
//! - [`Database`]: SQLite row store with transactional helpers
//! - [`ReviewScheduler`]: spaced-review engine
//! - [`PeriodicRunner`]: background scheduling loop
//! - [`NotificationGateway`]: injected sink for notification intents

pub mod activity;
pub mod clock;
pub mod error;
pub mod events;
pub mod grade;
pub mod leaderboard;
pub mod notify;
pub mod points;
pub mod review;
pub mod runner;
pub mod service;
pub mod storage;
pub mod streak;
pub mod users;

/// Identifier of a learner (or any other user).
pub type UserId = i64;
/// Identifier of a graded submission.
pub type SubmissionId = i64;

pub use activity::{ActivityEvent, ActivityKind, ActivityLedger, ChartDay, RecordOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{
    ConfigError, CoreError, DatabaseError, Result, ReviewError, StreakError, ValidationError,
};
pub use events::Event;
pub use grade::Grade;
pub use leaderboard::{Leaderboard, LeaderboardEntry, Period, PeriodKind};
pub use notify::{LogGateway, MemoryGateway, NotificationGateway, NotificationIntent};
pub use points::{ScoreGrant, ScoreKind, ScoreLedger};
pub use review::{
    Completion, MasteryRecord, MasteryStats, ObligationStatus, ReviewObligation, ReviewScheduler,
    INTERVALS,
};
pub use runner::{PeriodicRunner, RunnerState, TickReport};
pub use service::{LearningOverview, ReviewOutcome, StreakSummary, StudyCore};
pub use storage::{Config, Database};
pub use streak::{StreakAdvance, StreakState, StreakTracker, BONUS_TIERS};
pub use users::{Role, UserDirectory};
