// src/models/lesson.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Stored lesson lifecycle state. `cancelled` is the only state set
/// explicitly; the rest are derived from the wall clock via `auto_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "lesson_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Scheduled => "scheduled",
            LessonStatus::Ongoing => "ongoing",
            LessonStatus::Completed => "completed",
            LessonStatus::Cancelled => "cancelled",
        }
    }
}

/// Represents the 'lessons' table: a single scheduled teaching session
/// belonging to a batch. `duration_minutes` is mandatory at the data-model
/// level, so end-time arithmetic is always defined.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub batch_id: i64,
    pub title: String,
    pub description: String,
    pub meeting_link: Option<String>,

    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,

    pub status: LessonStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Lesson {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at > now
    }

    /// Inclusive on both bounds.
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_at && now <= self.end_time()
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time()
    }

    /// Effective status as of `now`. An explicit cancellation always wins;
    /// otherwise the wall clock decides.
    pub fn auto_status(&self, now: DateTime<Utc>) -> LessonStatus {
        if self.status == LessonStatus::Cancelled {
            return LessonStatus::Cancelled;
        }
        if self.is_upcoming(now) {
            LessonStatus::Scheduled
        } else if self.is_ongoing(now) {
            LessonStatus::Ongoing
        } else {
            LessonStatus::Completed
        }
    }
}

/// DTO for creating a new lesson.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    pub batch_id: i64,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 characters."
    ))]
    pub title: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 500), custom(function = validate_meeting_link))]
    pub meeting_link: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    #[serde(default = "default_duration")]
    pub duration_minutes: i32,
}

fn default_duration() -> i32 {
    60
}

/// Validates that the meeting link is a correctly formatted URL.
fn validate_meeting_link(link: &str) -> Result<(), validator::ValidationError> {
    if url::Url::parse(link).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// DTO for updating a lesson. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateLessonRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub meeting_link: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

/// Serialized lesson with derived fields attached.
#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub id: i64,
    pub batch_id: i64,
    pub title: String,
    pub description: String,
    pub meeting_link: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: LessonStatus,
    pub created_at: Option<DateTime<Utc>>,

    pub end_time: DateTime<Utc>,
    pub auto_status: LessonStatus,
}

impl LessonResponse {
    pub fn from_lesson(lesson: Lesson, now: DateTime<Utc>) -> Self {
        Self {
            end_time: lesson.end_time(),
            auto_status: lesson.auto_status(now),
            id: lesson.id,
            batch_id: lesson.batch_id,
            title: lesson.title,
            description: lesson.description,
            meeting_link: lesson.meeting_link,
            scheduled_at: lesson.scheduled_at,
            duration_minutes: lesson.duration_minutes,
            status: lesson.status,
            created_at: lesson.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lesson_at(scheduled_at: DateTime<Utc>, duration_minutes: i32, status: LessonStatus) -> Lesson {
        Lesson {
            id: 1,
            batch_id: 1,
            title: "Intro".to_string(),
            description: String::new(),
            meeting_link: None,
            scheduled_at,
            duration_minutes,
            status,
            created_at: None,
        }
    }

    fn at(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, h, min, 0).unwrap()
    }

    #[test]
    fn end_time_adds_duration() {
        let lesson = lesson_at(at(10, 0), 90, LessonStatus::Scheduled);
        assert_eq!(lesson.end_time(), at(11, 30));
    }

    #[test]
    fn ongoing_bounds_are_inclusive() {
        let lesson = lesson_at(at(10, 0), 60, LessonStatus::Scheduled);

        assert!(lesson.is_upcoming(at(9, 59)));
        assert!(!lesson.is_upcoming(at(10, 0)));

        assert!(lesson.is_ongoing(at(10, 0)));
        assert!(lesson.is_ongoing(at(10, 30)));
        assert!(lesson.is_ongoing(at(11, 0)));
        assert!(!lesson.is_ongoing(at(11, 1)));

        assert!(!lesson.has_ended(at(11, 0)));
        assert!(lesson.has_ended(at(11, 1)));
    }

    #[test]
    fn auto_status_follows_the_clock() {
        let lesson = lesson_at(at(10, 0), 60, LessonStatus::Scheduled);

        assert_eq!(lesson.auto_status(at(9, 0)), LessonStatus::Scheduled);
        assert_eq!(lesson.auto_status(at(10, 30)), LessonStatus::Ongoing);
        assert_eq!(lesson.auto_status(at(12, 0)), LessonStatus::Completed);
    }

    #[test]
    fn cancelled_wins_over_the_clock() {
        let lesson = lesson_at(at(10, 0), 60, LessonStatus::Cancelled);

        assert_eq!(lesson.auto_status(at(9, 0)), LessonStatus::Cancelled);
        assert_eq!(lesson.auto_status(at(10, 30)), LessonStatus::Cancelled);
        assert_eq!(lesson.auto_status(at(12, 0)), LessonStatus::Cancelled);
    }
}
