// src/models/enrollment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'enrollments' join table linking a student to a batch.
/// Unique per (batch_id, student_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub batch_id: i64,
    pub student_id: i64,
    pub enrolled_at: DateTime<Utc>,
}

/// Roster row joined from `enrollments` and `users`.
#[derive(Debug, Serialize, FromRow)]
pub struct RosterEntry {
    pub student_id: i64,
    pub name: String,
    pub email: String,
    pub enrolled_at: DateTime<Utc>,
}

/// DTO for enrolling a student into a batch.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: i64,
}
