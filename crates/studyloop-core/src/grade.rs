//! Submission grades.
//!
//! Grade labels are parsed once at the boundary; everything downstream works
//! with [`Grade`] and its [`GradeRule`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::points::ScoreKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Pending,
    Good,
    Excellent,
}

/// What a grade triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeRule {
    /// Quality grant awarded once per submission, if any.
    pub grant: Option<ScoreKind>,
    /// Whether the submission enters the spaced-review queue.
    pub enrolls_review: bool,
}

impl Grade {
    pub fn rule(&self) -> GradeRule {
        match self {
            Grade::Pending => GradeRule {
                grant: None,
                enrolls_review: false,
            },
            Grade::Good => GradeRule {
                grant: Some(ScoreKind::GoodGrade),
                enrolls_review: true,
            },
            Grade::Excellent => GradeRule {
                grant: Some(ScoreKind::ExcellentGrade),
                enrolls_review: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Pending => "pending",
            Grade::Good => "good",
            Grade::Excellent => "excellent",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Grade::Pending),
            "good" => Ok(Grade::Good),
            "excellent" => Ok(Grade::Excellent),
            _ => Err(ValidationError::UnknownGrade(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_quality_grades_enroll() {
        assert!(!Grade::Pending.rule().enrolls_review);
        assert!(Grade::Good.rule().enrolls_review);
        assert!(Grade::Excellent.rule().enrolls_review);
    }

    #[test]
    fn grants_follow_rule_table() {
        assert_eq!(Grade::Pending.rule().grant, None);
        assert_eq!(Grade::Good.rule().grant, Some(ScoreKind::GoodGrade));
        assert_eq!(Grade::Excellent.rule().grant, Some(ScoreKind::ExcellentGrade));
    }

    #[test]
    fn parsing_is_case_insensitive_and_closed() {
        assert_eq!(" Excellent ".parse::<Grade>().unwrap(), Grade::Excellent);
        assert!(matches!(
            "great".parse::<Grade>(),
            Err(ValidationError::UnknownGrade(_))
        ));
    }
}
