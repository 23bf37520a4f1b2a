use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityKind;
use crate::grade::Grade;
use crate::{SubmissionId, UserId};

/// Inbound events from collaborators (grading, the HTTP layer).
/// Fed to [`crate::StudyCore::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SubmissionGraded {
        user_id: UserId,
        submission_id: SubmissionId,
        grade: Grade,
        graded_date: NaiveDate,
    },
    UserAction {
        user_id: UserId,
        action_kind: ActivityKind,
        occurred_date: NaiveDate,
    },
}

impl Event {
    pub fn user_id(&self) -> UserId {
        match self {
            Event::SubmissionGraded { user_id, .. } | Event::UserAction { user_id, .. } => *user_id,
        }
    }
}
