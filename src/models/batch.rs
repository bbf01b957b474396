// src/models/batch.rs

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'batches' table in the database.
/// A batch is a cohort of students taught together by one teacher over a
/// date range.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    pub description: String,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    /// Enrollment cap. A batch without a cap is never full.
    pub max_students: Option<i32>,
    pub is_active: bool,

    pub created_at: Option<DateTime<Utc>>,
}

/// Outcome of an enrollment request against a batch's current state.
/// These are normal results, not errors: callers decide how to surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    Enrolled,
    /// Enrolling an already-enrolled student is an idempotent no-op.
    AlreadyEnrolled,
    BatchInactive,
    BatchFull,
}

impl EnrollmentOutcome {
    /// Whether this outcome created a new enrollment record.
    pub fn accepted(&self) -> bool {
        matches!(self, EnrollmentOutcome::Enrolled)
    }
}

/// Outcome of an unenrollment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed,
    NotEnrolled,
}

impl Batch {
    /// True iff a cap is set and the current enrollment meets or exceeds it.
    pub fn is_full(&self, enrolled_count: i64) -> bool {
        match self.max_students {
            Some(max) => enrolled_count >= max as i64,
            None => false,
        }
    }

    pub fn can_accept_more_students(&self, enrolled_count: i64) -> bool {
        if !self.is_active {
            return false;
        }
        match self.max_students {
            Some(max) => enrolled_count < max as i64,
            None => true,
        }
    }

    /// Pure decision core of the enroll operation. The caller is responsible
    /// for making the check-then-insert atomic (row lock on the batch).
    pub fn enrollment_decision(
        &self,
        enrolled_count: i64,
        already_enrolled: bool,
    ) -> EnrollmentOutcome {
        if already_enrolled {
            return EnrollmentOutcome::AlreadyEnrolled;
        }
        if !self.is_active {
            return EnrollmentOutcome::BatchInactive;
        }
        if self.is_full(enrolled_count) {
            return EnrollmentOutcome::BatchFull;
        }
        EnrollmentOutcome::Enrolled
    }

    pub fn removal_decision(&self, enrolled: bool) -> RemovalOutcome {
        if enrolled {
            RemovalOutcome::Removed
        } else {
            RemovalOutcome::NotEnrolled
        }
    }

    /// Whole days until the start date, clamped to zero.
    /// A batch without a start date reports 0.
    pub fn days_until_start(&self, now: DateTime<Utc>) -> i64 {
        match self.start_date {
            Some(start) => (start - now.date_naive()).num_days().max(0),
            None => 0,
        }
    }

    /// Human-facing status. Inactive wins over every date-based rule.
    pub fn status_text(&self, now: DateTime<Utc>) -> String {
        if !self.is_active {
            return "Inactive".to_string();
        }

        let Some(start) = self.start_date else {
            return "Active".to_string();
        };

        let today = now.date_naive();

        if start > today {
            let days = (start - today).num_days();
            if days > 7 {
                "Starting Soon".to_string()
            } else if days == 1 {
                "Starting Tomorrow".to_string()
            } else {
                format!("Starts in {} days", days)
            }
        } else if start == today {
            "Starting Today".to_string()
        } else {
            // Start is in the past.
            match self.end_date {
                Some(end) if today > end => "Completed".to_string(),
                _ => "Active".to_string(),
            }
        }
    }

    /// Human-facing duration. Uses calendar-month subtraction, not a 30-day
    /// approximation.
    pub fn duration_text(&self) -> String {
        let Some(start) = self.start_date else {
            return "No duration set".to_string();
        };
        let Some(end) = self.end_date else {
            return format!("Started {} (Ongoing)", start.format("%b %d, %Y"));
        };

        let months = months_between(start, end);
        if months == 0 {
            let days = (end - start).num_days();
            if days == 1 {
                "1 day".to_string()
            } else {
                format!("{} days", days)
            }
        } else if months == 1 {
            "1 month".to_string()
        } else {
            format!("{} months", months)
        }
    }

    /// Share of the batch's date range elapsed as of `now`, in percent with
    /// one decimal. None when either date is missing.
    pub fn progress_percentage(&self, now: DateTime<Utc>) -> Option<f64> {
        let (start, end) = match (self.start_date, self.end_date) {
            (Some(s), Some(e)) => (s, e),
            _ => return None,
        };

        let today = now.date_naive();
        if today < start {
            return Some(0.0);
        }
        if today > end {
            return Some(100.0);
        }

        let total_days = (end - start).num_days();
        if total_days <= 0 {
            return Some(100.0);
        }
        let elapsed_days = (today - start).num_days();
        Some(round1(elapsed_days as f64 / total_days as f64 * 100.0))
    }

    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        let today = now.date_naive();
        if let Some(start) = self.start_date {
            if today < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if today > end {
                return false;
            }
        }
        true
    }
}

/// Whole calendar months from `start` to `end` (never negative).
/// A partial trailing month does not count.
fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut months =
        (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32);
    if (end.day() as i32) < (start.day() as i32) {
        months -= 1;
    }
    months.max(0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// DTO for creating a new batch.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchRequest {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Name length must be between 1 and 150 characters."
    ))]
    pub name: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1))]
    pub max_students: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// DTO for updating a batch. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateBatchRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_students: Option<i32>,
    pub is_active: Option<bool>,
}

/// Serialized batch with read-only derived fields attached for the UI.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_students: Option<i32>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,

    pub students_count: i64,
    pub is_full: bool,
    pub status_text: String,
    pub duration_text: String,
    pub progress_percentage: Option<f64>,
}

impl BatchResponse {
    pub fn from_batch(batch: Batch, students_count: i64, now: DateTime<Utc>) -> Self {
        Self {
            is_full: batch.is_full(students_count),
            status_text: batch.status_text(now),
            duration_text: batch.duration_text(),
            progress_percentage: batch.progress_percentage(now),
            students_count,
            id: batch.id,
            teacher_id: batch.teacher_id,
            name: batch.name,
            description: batch.description,
            start_date: batch.start_date,
            end_date: batch.end_date,
            max_students: batch.max_students,
            is_active: batch.is_active,
            created_at: batch.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_batch(
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        max_students: Option<i32>,
        is_active: bool,
    ) -> Batch {
        Batch {
            id: 1,
            teacher_id: 1,
            name: "Evening Cohort".to_string(),
            description: String::new(),
            start_date,
            end_date,
            max_students,
            is_active,
            created_at: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn uncapped_batch_is_never_full() {
        let batch = test_batch(None, None, None, true);
        assert!(!batch.is_full(0));
        assert!(!batch.is_full(10_000));
    }

    #[test]
    fn inactive_batch_accepts_nobody() {
        let batch = test_batch(None, None, None, false);
        assert!(!batch.can_accept_more_students(0));
        let capped = test_batch(None, None, Some(100), false);
        assert!(!capped.can_accept_more_students(0));
    }

    #[test]
    fn capacity_boundary() {
        let batch = test_batch(None, None, Some(2), true);
        assert!(batch.can_accept_more_students(1));
        assert!(!batch.can_accept_more_students(2));
        assert!(batch.is_full(2));
        assert!(!batch.is_full(1));
    }

    #[test]
    fn enrollment_decision_sequence_with_cap_two() {
        let batch = test_batch(None, None, Some(2), true);

        let first = batch.enrollment_decision(0, false);
        assert_eq!(first, EnrollmentOutcome::Enrolled);
        assert!(first.accepted());

        let second = batch.enrollment_decision(1, false);
        assert_eq!(second, EnrollmentOutcome::Enrolled);

        let third = batch.enrollment_decision(2, false);
        assert_eq!(third, EnrollmentOutcome::BatchFull);
        assert!(!third.accepted());
    }

    #[test]
    fn enrolling_twice_is_a_no_op() {
        let batch = test_batch(None, None, Some(10), true);
        assert_eq!(
            batch.enrollment_decision(1, true),
            EnrollmentOutcome::AlreadyEnrolled
        );
    }

    #[test]
    fn removal_of_non_member_reports_not_enrolled() {
        let batch = test_batch(None, None, None, true);
        assert_eq!(batch.removal_decision(true), RemovalOutcome::Removed);
        assert_eq!(batch.removal_decision(false), RemovalOutcome::NotEnrolled);
    }

    #[test]
    fn days_until_start_is_never_negative() {
        let now = at(2026, 6, 15);
        let past = test_batch(Some(date(2026, 6, 1)), None, None, true);
        assert_eq!(past.days_until_start(now), 0);

        let future = test_batch(Some(date(2026, 6, 20)), None, None, true);
        assert_eq!(future.days_until_start(now), 5);

        let unset = test_batch(None, None, None, true);
        assert_eq!(unset.days_until_start(now), 0);
    }

    #[test]
    fn inactive_overrides_all_date_rules() {
        let now = at(2026, 6, 15);
        // Starts tomorrow but inactive.
        let batch = test_batch(Some(date(2026, 6, 16)), None, None, false);
        assert_eq!(batch.status_text(now), "Inactive");
    }

    #[test]
    fn status_text_decision_table() {
        let now = at(2026, 6, 15);

        let no_start = test_batch(None, None, None, true);
        assert_eq!(no_start.status_text(now), "Active");

        let far = test_batch(Some(date(2026, 6, 30)), None, None, true);
        assert_eq!(far.status_text(now), "Starting Soon");

        let tomorrow = test_batch(Some(date(2026, 6, 16)), None, None, true);
        assert_eq!(tomorrow.status_text(now), "Starting Tomorrow");

        let in_five = test_batch(Some(date(2026, 6, 20)), None, None, true);
        assert_eq!(in_five.status_text(now), "Starts in 5 days");

        let exactly_seven = test_batch(Some(date(2026, 6, 22)), None, None, true);
        assert_eq!(exactly_seven.status_text(now), "Starts in 7 days");

        let today = test_batch(Some(date(2026, 6, 15)), None, None, true);
        assert_eq!(today.status_text(now), "Starting Today");

        let running = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 7, 1)), None, true);
        assert_eq!(running.status_text(now), "Active");

        let over = test_batch(Some(date(2026, 5, 1)), Some(date(2026, 6, 1)), None, true);
        assert_eq!(over.status_text(now), "Completed");

        let past_no_end = test_batch(Some(date(2026, 5, 1)), None, None, true);
        assert_eq!(past_no_end.status_text(now), "Active");
    }

    #[test]
    fn duration_text_uses_calendar_months() {
        let no_start = test_batch(None, Some(date(2026, 9, 1)), None, true);
        assert_eq!(no_start.duration_text(), "No duration set");

        let ongoing = test_batch(Some(date(2026, 6, 1)), None, None, true);
        assert_eq!(ongoing.duration_text(), "Started Jun 01, 2026 (Ongoing)");

        let one_day = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 6, 2)), None, true);
        assert_eq!(one_day.duration_text(), "1 day");

        let ten_days = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 6, 11)), None, true);
        assert_eq!(ten_days.duration_text(), "10 days");

        let one_month = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 7, 1)), None, true);
        assert_eq!(one_month.duration_text(), "1 month");

        // Jan 31 -> Mar 30 is one whole month, not two: the trailing partial
        // month is dropped by calendar subtraction.
        let partial = test_batch(Some(date(2026, 1, 31)), Some(date(2026, 3, 30)), None, true);
        assert_eq!(partial.duration_text(), "1 month");

        let three_months = test_batch(Some(date(2026, 1, 15)), Some(date(2026, 4, 15)), None, true);
        assert_eq!(three_months.duration_text(), "3 months");

        // 29 days within the same month counts as days, not a month.
        let almost_month = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 6, 30)), None, true);
        assert_eq!(almost_month.duration_text(), "29 days");
    }

    #[test]
    fn progress_requires_both_dates() {
        let now = at(2026, 6, 15);
        assert_eq!(test_batch(None, None, None, true).progress_percentage(now), None);
        assert_eq!(
            test_batch(Some(date(2026, 6, 1)), None, None, true).progress_percentage(now),
            None
        );
    }

    #[test]
    fn progress_clamps_and_rounds() {
        let batch = test_batch(Some(date(2026, 6, 10)), Some(date(2026, 6, 20)), None, true);

        assert_eq!(batch.progress_percentage(at(2026, 6, 1)), Some(0.0));
        assert_eq!(batch.progress_percentage(at(2026, 6, 25)), Some(100.0));
        assert_eq!(batch.progress_percentage(at(2026, 6, 15)), Some(50.0));

        // 1/3 elapsed rounds to one decimal.
        let thirds = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 6, 4)), None, true);
        assert_eq!(thirds.progress_percentage(at(2026, 6, 2)), Some(33.3));
    }

    #[test]
    fn midway_batch_is_currently_active_at_fifty_percent() {
        // Started 10 days ago, ends in 10 days.
        let now = at(2026, 6, 15);
        let batch = test_batch(Some(date(2026, 6, 5)), Some(date(2026, 6, 25)), None, true);
        assert!(batch.is_currently_active(now));
        assert_eq!(batch.progress_percentage(now), Some(50.0));
    }

    #[test]
    fn currently_active_respects_window_and_flag() {
        let now = at(2026, 6, 15);

        let not_started = test_batch(Some(date(2026, 7, 1)), None, None, true);
        assert!(!not_started.is_currently_active(now));

        let ended = test_batch(Some(date(2026, 5, 1)), Some(date(2026, 6, 1)), None, true);
        assert!(!ended.is_currently_active(now));

        let inactive = test_batch(Some(date(2026, 6, 1)), Some(date(2026, 7, 1)), None, false);
        assert!(!inactive.is_currently_active(now));

        let dateless = test_batch(None, None, None, true);
        assert!(dateless.is_currently_active(now));
    }
}
