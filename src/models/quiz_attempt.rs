// src/models/quiz_attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attempt lifecycle. `in_progress -> submitted` is the only transition;
/// submitted is terminal. A retake is a new attempt with a higher
/// `attempt_number`, not a reopened one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

/// Represents the 'quiz_attempts' table: one student's instance of taking
/// a quiz.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub attempt_number: i32,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub score: i32,
    pub total_points: i32,
    pub status: AttemptStatus,
}

impl QuizAttempt {
    pub fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }

    /// Score as a percentage of the attainable points. A zero-point quiz
    /// always reports 0, never a division error.
    pub fn percentage(&self) -> f64 {
        if self.total_points == 0 {
            0.0
        } else {
            (self.score as f64 / self.total_points as f64) * 100.0
        }
    }

    pub fn passed(&self, pass_marks: i32) -> bool {
        self.score >= pass_marks
    }
}

/// Represents the 'quiz_answers' table: one answer within an attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub answer: String,
    pub is_correct: bool,
    pub marks_awarded: i32,
}

/// DTO for recording an answer inside an in-progress attempt.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub answer: String,
}

/// Serialized attempt with derived grading fields.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: i32,
    pub total_points: i32,
    pub status: AttemptStatus,

    pub percentage: f64,
    pub passed: bool,
}

impl AttemptResponse {
    pub fn from_attempt(attempt: QuizAttempt, pass_marks: i32) -> Self {
        Self {
            percentage: attempt.percentage(),
            passed: attempt.passed(pass_marks),
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            score: attempt.score,
            total_points: attempt.total_points,
            status: attempt.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(score: i32, total_points: i32, status: AttemptStatus) -> QuizAttempt {
        QuizAttempt {
            id: 1,
            quiz_id: 1,
            student_id: 1,
            attempt_number: 1,
            started_at: Utc::now(),
            completed_at: None,
            score,
            total_points,
            status,
        }
    }

    #[test]
    fn zero_point_quiz_reports_zero_percent() {
        assert_eq!(attempt(0, 0, AttemptStatus::Submitted).percentage(), 0.0);
        // Even a nonsensical positive score cannot divide by zero.
        assert_eq!(attempt(45, 0, AttemptStatus::Submitted).percentage(), 0.0);
    }

    #[test]
    fn percentage_of_regular_attempt() {
        assert_eq!(attempt(45, 50, AttemptStatus::Submitted).percentage(), 90.0);
        assert_eq!(attempt(25, 50, AttemptStatus::Submitted).percentage(), 50.0);
    }

    #[test]
    fn pass_is_score_against_pass_marks() {
        // Quiz with total 50, pass 30: 45 passes, 25 fails.
        assert!(attempt(45, 50, AttemptStatus::Submitted).passed(30));
        assert!(!attempt(25, 50, AttemptStatus::Submitted).passed(30));
        assert!(attempt(30, 50, AttemptStatus::Submitted).passed(30));
    }
}
