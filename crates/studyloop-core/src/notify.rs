//! Outbound notification intents.
//!
//! The core decides *that* a learner should hear about something; delivery,
//! quiet hours and channel choice belong to the gateway implementation.
//! Intents are sent after the owning transaction commits, and a delivery
//! failure never undoes the state change that triggered it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::{SubmissionId, UserId};

/// Error type gateways report delivery failures with.
pub type GatewayError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationIntent {
    StreakBonus {
        streak: u32,
        points: u32,
        description: String,
    },
    ReviewDue {
        due_count: u32,
        most_overdue_days: i64,
    },
    MasteryAchieved {
        submission_id: SubmissionId,
        total_days_to_master: i64,
    },
}

impl NotificationIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationIntent::StreakBonus { .. } => "streak_bonus",
            NotificationIntent::ReviewDue { .. } => "review_due",
            NotificationIntent::MasteryAchieved { .. } => "mastery_achieved",
        }
    }
}

/// Sink for notification intents.
pub trait NotificationGateway: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn notify(&self, user_id: UserId, intent: &NotificationIntent) -> Result<(), GatewayError>;
}

/// Hand an intent to the gateway, logging instead of propagating failures.
pub(crate) fn deliver(gateway: &dyn NotificationGateway, user_id: UserId, intent: NotificationIntent) {
    if let Err(e) = gateway.notify(user_id, &intent) {
        tracing::warn!(
            user_id,
            gateway = gateway.name(),
            kind = intent.kind(),
            "notification delivery failed: {e}"
        );
    }
}

/// Writes intents to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

impl NotificationGateway for LogGateway {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, user_id: UserId, intent: &NotificationIntent) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(intent)?;
        tracing::info!(user_id, kind = intent.kind(), %payload, "notification");
        Ok(())
    }
}

/// Keeps every intent in memory.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    sent: Mutex<Vec<(UserId, NotificationIntent)>>,
    failing: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that rejects every intent (still recording it).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<(UserId, NotificationIntent)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<NotificationIntent> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, intent)| intent)
            .collect()
    }
}

impl NotificationGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    fn notify(&self, user_id: UserId, intent: &NotificationIntent) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .map_err(|_| "memory gateway poisoned")?
            .push((user_id, intent.clone()));
        if self.failing {
            return Err("delivery rejected".into());
        }
        Ok(())
    }
}
