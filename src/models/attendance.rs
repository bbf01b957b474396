// src/models/attendance.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

/// Represents the 'attendance' table. One record per (lesson, student);
/// re-marking replaces the previous record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attendance {
    pub lesson_id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
    pub marked_by: i64,
}

/// Attendance row joined with the student for roster display.
#[derive(Debug, Serialize, FromRow)]
pub struct AttendanceEntry {
    pub student_id: i64,
    pub name: String,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
    pub marked_by: i64,
}

/// One mark inside a bulk attendance submission.
#[derive(Debug, Deserialize)]
pub struct AttendanceMark {
    pub student_id: i64,
    pub status: AttendanceStatus,
}

/// DTO for bulk-marking attendance for a lesson.
#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    pub marks: Vec<AttendanceMark>,
}
