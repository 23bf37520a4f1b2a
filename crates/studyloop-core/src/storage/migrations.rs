//! Database schema migrations for studyloop.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, activity ledger, streak state and point ledger.
///
/// Uniqueness rules that the ledger relies on:
/// - one event row per (user, day, kind)
/// - one *counted* event per (user, day), via a partial unique index
/// - one grade grant per (submission, kind)
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            user_id     INTEGER PRIMARY KEY,
            role        TEXT NOT NULL DEFAULT 'student',
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS activity_events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL,
            activity_date TEXT NOT NULL,
            activity_kind TEXT NOT NULL,
            counted       INTEGER NOT NULL DEFAULT 0,
            recorded_at   TEXT NOT NULL,
            UNIQUE (user_id, activity_date, activity_kind)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_activity_counted_day
            ON activity_events(user_id, activity_date) WHERE counted = 1;

        CREATE TABLE IF NOT EXISTS streak_states (
            user_id            INTEGER PRIMARY KEY,
            current_streak     INTEGER NOT NULL DEFAULT 0,
            best_streak        INTEGER NOT NULL DEFAULT 0,
            last_activity_date TEXT,
            CHECK (best_streak >= current_streak)
        );

        CREATE TABLE IF NOT EXISTS score_grants (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL,
            kind          TEXT NOT NULL,
            value         INTEGER NOT NULL CHECK (value > 0),
            description   TEXT NOT NULL DEFAULT '',
            granted_on    TEXT NOT NULL,
            year          INTEGER NOT NULL,
            month         INTEGER NOT NULL,
            quarter       INTEGER NOT NULL,
            submission_id INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_score_user_date ON score_grants(user_id, granted_on);
        CREATE INDEX IF NOT EXISTS idx_score_year_month ON score_grants(year, month);
        CREATE INDEX IF NOT EXISTS idx_score_year_quarter ON score_grants(year, quarter);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_score_grade_once
            ON score_grants(submission_id, kind)
            WHERE kind IN ('good_grade', 'excellent_grade');

        CREATE TABLE IF NOT EXISTS graded_submissions (
            submission_id INTEGER PRIMARY KEY,
            user_id       INTEGER NOT NULL,
            grade         TEXT NOT NULL,
            graded_on     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graded_user ON graded_submissions(user_id, grade);

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;

    tx.commit()?;
    Ok(())
}

/// Migration v2: spaced-review obligations and mastery records.
///
/// At most one pending obligation per (user, submission) and one row per
/// interval index keep a chain at five rows or fewer.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS review_obligations (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL,
            submission_id   INTEGER NOT NULL,
            review_index    INTEGER NOT NULL CHECK (review_index BETWEEN 0 AND 4),
            scheduled_date  TEXT NOT NULL,
            origin_date     TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            completed_at    TEXT,
            system_advanced INTEGER NOT NULL DEFAULT 0,
            is_mastered     INTEGER NOT NULL DEFAULT 0,
            mastered_at     TEXT,
            UNIQUE (user_id, submission_id, review_index)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_review_one_pending
            ON review_obligations(user_id, submission_id) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_review_due
            ON review_obligations(user_id, status, scheduled_date);

        CREATE TABLE IF NOT EXISTS mastery_records (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id              INTEGER NOT NULL,
            submission_id        INTEGER NOT NULL,
            origin_date          TEXT NOT NULL,
            mastered_date        TEXT NOT NULL,
            total_days_to_master INTEGER NOT NULL,
            UNIQUE (user_id, submission_id)
        );",
    )?;

    set_schema_version(&tx, 2)?;

    tx.commit()?;
    Ok(())
}
