//! Core error types for studyloop-core.
//!
//! This module defines the error hierarchy using thiserror. Storage failures,
//! data-integrity signals and "nothing to do" conditions are kept apart so
//! callers can decide which ones to surface.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::{SubmissionId, UserId};

/// Core error type for studyloop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Streak integrity errors
    #[error("Streak error: {0}")]
    Streak(#[from] StreakError),

    /// Review chain errors
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    /// Whether the caller should treat this as "operation failed, retry".
    ///
    /// Transactions are rolled back on every error, so a retry starts from a
    /// clean state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Database(e) if !matches!(e, DatabaseError::UniqueViolation(_)))
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors raised at the boundary.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Month outside 1..=12 or quarter outside 1..=4
    #[error("Invalid {kind} period value {value} (expected 1..={max})")]
    InvalidPeriod {
        kind: &'static str,
        value: u32,
        max: u32,
    },

    /// Grade label not in the closed set
    #[error("Unknown grade: {0}")]
    UnknownGrade(String),

    /// Activity kind label not in the closed set
    #[error("Unknown activity kind: {0}")]
    UnknownActivityKind(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Streak integrity signals.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StreakError {
    /// Activity date precedes the stored last activity date
    #[error("activity date {date} precedes last activity date {last}")]
    InvalidDateOrder { last: NaiveDate, date: NaiveDate },
}

/// Review chain conditions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReviewError {
    /// No pending obligation for the chain
    #[error("no pending review for user {user_id}, submission {submission_id}")]
    ObligationNotFound {
        user_id: UserId,
        submission_id: SubmissionId,
    },

    /// The chain already ended in mastery
    #[error("submission {submission_id} already mastered by user {user_id}")]
    AlreadyMastered {
        user_id: UserId,
        submission_id: SubmissionId,
    },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    DatabaseError::UniqueViolation(
                        msg.clone().unwrap_or_else(|| code.to_string()),
                    )
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
