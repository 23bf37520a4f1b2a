//! User directory: roles and activity flags.
//!
//! Only active students take part in leaderboards and the nightly review pass.
//! Inbound events for an unknown user register them as an active student.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::storage::{parse_column, Database};
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidValue {
                field: "role".into(),
                message: format!("unknown role '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub role: Role,
    pub is_active: bool,
}

/// Register `user_id` as an active student unless already known.
pub(crate) fn ensure_user_in(conn: &Connection, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, role, is_active, created_at)
         VALUES (?1, 'student', 1, ?2)",
        params![user_id, now],
    )?;
    Ok(())
}

/// Active students, ascending by id.
pub(crate) fn active_students_in(conn: &Connection) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM users WHERE role = 'student' AND is_active = 1 ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, UserId>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or update a user's role. New users start active.
    pub fn register_user(&self, user_id: UserId, role: Role) -> Result<UserRecord> {
        self.db.transaction(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, role, is_active, created_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
                params![user_id, role.as_str(), Utc::now()],
            )?;
            get_in(conn, user_id)?.ok_or_else(|| {
                ValidationError::InvalidValue {
                    field: "user_id".into(),
                    message: format!("user {user_id} vanished after insert"),
                }
                .into()
            })
        })
    }

    /// Activate or deactivate a user. Returns false if the user is unknown.
    pub fn set_active(&self, user_id: UserId, active: bool) -> Result<bool> {
        self.db.transaction(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2 WHERE user_id = ?1",
                params![user_id, active],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        self.db.read(|conn| get_in(conn, user_id))
    }

    pub fn active_students(&self) -> Result<Vec<UserId>> {
        self.db.read(active_students_in)
    }
}

fn get_in(conn: &Connection, user_id: UserId) -> Result<Option<UserRecord>> {
    let record = conn
        .query_row(
            "SELECT user_id, role, is_active FROM users WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    role: parse_column(row, 1)?,
                    is_active: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}
