// src/models/activity_log.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// The entity an activity entry refers to. Stored as a (kind, id) pair; the
/// set of kinds is closed, so lookups dispatch over this enum instead of a
/// free-form type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActivityTarget {
    User(i64),
    Batch(i64),
    Lesson(i64),
    Quiz(i64),
    QuizAttempt(i64),
}

impl ActivityTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityTarget::User(_) => "user",
            ActivityTarget::Batch(_) => "batch",
            ActivityTarget::Lesson(_) => "lesson",
            ActivityTarget::Quiz(_) => "quiz",
            ActivityTarget::QuizAttempt(_) => "quiz_attempt",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ActivityTarget::User(id)
            | ActivityTarget::Batch(id)
            | ActivityTarget::Lesson(id)
            | ActivityTarget::Quiz(id)
            | ActivityTarget::QuizAttempt(id) => *id,
        }
    }

    /// Rebuilds a target from its stored parts. Unknown kinds return None
    /// rather than erroring: old rows must stay readable.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "user" => Some(ActivityTarget::User(id)),
            "batch" => Some(ActivityTarget::Batch(id)),
            "lesson" => Some(ActivityTarget::Lesson(id)),
            "quiz" => Some(ActivityTarget::Quiz(id)),
            "quiz_attempt" => Some(ActivityTarget::QuizAttempt(id)),
            _ => None,
        }
    }
}

/// Represents the 'activity_logs' table. Append-only: rows are never
/// mutated or deleted by normal flow.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub data: Json<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn target(&self) -> Option<ActivityTarget> {
        match (self.target_type.as_deref(), self.target_id) {
            (Some(kind), Some(id)) => ActivityTarget::from_parts(kind, id),
            _ => None,
        }
    }
}

/// Query parameters for listing activity entries.
#[derive(Debug, Deserialize)]
pub struct ActivityListParams {
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parts_round_trip() {
        let targets = [
            ActivityTarget::User(1),
            ActivityTarget::Batch(2),
            ActivityTarget::Lesson(3),
            ActivityTarget::Quiz(4),
            ActivityTarget::QuizAttempt(5),
        ];
        for target in targets {
            let rebuilt = ActivityTarget::from_parts(target.kind(), target.id());
            assert_eq!(rebuilt, Some(target));
        }
    }

    #[test]
    fn unknown_kind_is_none() {
        assert_eq!(ActivityTarget::from_parts("spaceship", 9), None);
    }
}
