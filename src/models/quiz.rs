// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::quiz_attempt::{AttemptStatus, QuizAttempt};

/// Represents the 'quizzes' table: a timed or untimed assessment with a
/// question bank, belonging to a batch.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub batch_id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: String,

    /// Availability window. Either bound may be absent; an absent end time
    /// never closes the quiz.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Time limit per attempt, if any.
    pub duration_minutes: Option<i32>,

    pub total_marks: i32,
    pub pass_marks: i32,

    pub max_attempts: Option<i32>,

    pub is_active: bool,
    pub randomize_questions: bool,

    pub created_at: Option<DateTime<Utc>>,
}

/// Gate for creating a new attempt. Enforced at the call site, inside the
/// same transaction that inserts the attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptGate {
    Allowed,
    QuizClosed,
    InProgressExists,
    MaxAttemptsReached,
}

impl Quiz {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        match self.start_time {
            Some(start) => now >= start,
            None => true,
        }
    }

    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        match self.end_time {
            Some(end) => now > end,
            None => false,
        }
    }

    /// Whether the quiz still awaits this student: open window, active, and
    /// no submitted attempt yet. An in-progress attempt leaves the quiz
    /// pending — a student who started but did not finish still sees it.
    ///
    /// `attempts` must already be filtered to this (quiz, student) pair.
    pub fn is_pending_for(&self, now: DateTime<Utc>, attempts: &[QuizAttempt]) -> bool {
        if !self.is_active {
            return false;
        }
        if self.has_closed(now) {
            return false;
        }
        !Self::has_been_completed(attempts)
    }

    pub fn has_been_completed(attempts: &[QuizAttempt]) -> bool {
        attempts.iter().any(|a| a.status == AttemptStatus::Submitted)
    }

    pub fn has_in_progress_attempt(attempts: &[QuizAttempt]) -> bool {
        attempts
            .iter()
            .any(|a| a.status == AttemptStatus::InProgress)
    }

    /// Decides whether a new attempt may be created. Membership in the
    /// quiz's batch is a separate check applied by the caller; it is never
    /// merged into this gate.
    pub fn attempt_gate(&self, now: DateTime<Utc>, attempts: &[QuizAttempt]) -> AttemptGate {
        if !self.is_active || !self.has_started(now) || self.has_closed(now) {
            return AttemptGate::QuizClosed;
        }
        if Self::has_in_progress_attempt(attempts) {
            return AttemptGate::InProgressExists;
        }
        if let Some(max) = self.max_attempts {
            if attempts.len() as i32 >= max {
                return AttemptGate::MaxAttemptsReached;
            }
        }
        AttemptGate::Allowed
    }

    pub fn next_attempt_number(attempts: &[QuizAttempt]) -> i32 {
        attempts.iter().map(|a| a.attempt_number).max().unwrap_or(0) + 1
    }
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
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
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub pass_marks: i32,
    #[validate(range(min = 1))]
    pub max_attempts: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub randomize_questions: bool,
}

fn default_true() -> bool {
    true
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuizRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub pass_marks: Option<i32>,
    pub max_attempts: Option<i32>,
    pub is_active: Option<bool>,
    pub randomize_questions: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiz(
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        max_attempts: Option<i32>,
        is_active: bool,
    ) -> Quiz {
        Quiz {
            id: 1,
            batch_id: 1,
            teacher_id: 1,
            title: "Weekly Quiz".to_string(),
            description: String::new(),
            start_time,
            end_time,
            duration_minutes: None,
            total_marks: 50,
            pass_marks: 30,
            max_attempts,
            is_active,
            randomize_questions: false,
            created_at: None,
        }
    }

    fn attempt(attempt_number: i32, status: AttemptStatus) -> QuizAttempt {
        QuizAttempt {
            id: attempt_number as i64,
            quiz_id: 1,
            student_id: 7,
            attempt_number,
            started_at: Utc::now(),
            completed_at: None,
            score: 0,
            total_points: 50,
            status,
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn closed_quiz_is_pending_for_nobody() {
        let now = at(15, 12);
        let quiz = quiz(None, Some(at(10, 12)), None, true);

        assert!(!quiz.is_pending_for(now, &[]));
        assert!(!quiz.is_pending_for(now, &[attempt(1, AttemptStatus::InProgress)]));
        assert!(!quiz.is_pending_for(now, &[attempt(1, AttemptStatus::Submitted)]));
    }

    #[test]
    fn inactive_quiz_is_not_pending() {
        let now = at(15, 12);
        let quiz = quiz(None, Some(at(20, 12)), None, false);
        assert!(!quiz.is_pending_for(now, &[]));
    }

    #[test]
    fn in_progress_attempt_keeps_quiz_pending() {
        let now = at(15, 12);
        let quiz = quiz(None, Some(at(20, 12)), None, true);

        assert!(quiz.is_pending_for(now, &[]));
        assert!(quiz.is_pending_for(now, &[attempt(1, AttemptStatus::InProgress)]));
        assert!(!quiz.is_pending_for(now, &[attempt(1, AttemptStatus::Submitted)]));
    }

    #[test]
    fn missing_end_time_never_closes_the_window() {
        let now = at(15, 12);
        let quiz = quiz(None, None, None, true);
        assert!(quiz.is_pending_for(now, &[]));
        assert!(!quiz.has_closed(now));
    }

    #[test]
    fn completion_requires_a_submitted_attempt() {
        let in_progress = [attempt(1, AttemptStatus::InProgress)];
        assert!(!Quiz::has_been_completed(&in_progress));
        assert!(Quiz::has_in_progress_attempt(&in_progress));

        let submitted = [
            attempt(1, AttemptStatus::Submitted),
            attempt(2, AttemptStatus::InProgress),
        ];
        assert!(Quiz::has_been_completed(&submitted));
    }

    #[test]
    fn attempt_gate_blocks_open_attempts_and_exhausted_retries() {
        let now = at(15, 12);
        let quiz = quiz(None, None, Some(2), true);

        assert_eq!(quiz.attempt_gate(now, &[]), AttemptGate::Allowed);
        assert_eq!(
            quiz.attempt_gate(now, &[attempt(1, AttemptStatus::InProgress)]),
            AttemptGate::InProgressExists
        );
        assert_eq!(
            quiz.attempt_gate(
                now,
                &[
                    attempt(1, AttemptStatus::Submitted),
                    attempt(2, AttemptStatus::Submitted),
                ]
            ),
            AttemptGate::MaxAttemptsReached
        );
        assert_eq!(
            quiz.attempt_gate(now, &[attempt(1, AttemptStatus::Submitted)]),
            AttemptGate::Allowed
        );
    }

    #[test]
    fn attempt_gate_respects_the_window() {
        let not_open = quiz(Some(at(20, 12)), None, None, true);
        assert_eq!(not_open.attempt_gate(at(15, 12), &[]), AttemptGate::QuizClosed);

        let over = quiz(None, Some(at(10, 12)), None, true);
        assert_eq!(over.attempt_gate(at(15, 12), &[]), AttemptGate::QuizClosed);
    }

    #[test]
    fn attempt_numbers_increase_monotonically() {
        assert_eq!(Quiz::next_attempt_number(&[]), 1);
        let existing = [
            attempt(1, AttemptStatus::Submitted),
            attempt(2, AttemptStatus::Submitted),
        ];
        assert_eq!(Quiz::next_attempt_number(&existing), 3);
    }
}
