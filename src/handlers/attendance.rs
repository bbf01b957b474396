// src/handlers/attendance.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::{activity, batch::fetch_batch, can_manage, lesson::fetch_lesson},
    models::{activity_log::ActivityTarget, attendance::{AttendanceEntry, MarkAttendanceRequest}},
    utils::jwt::Claims,
};

/// Bulk-marks attendance for a lesson. One record per (lesson, student):
/// re-marking replaces the earlier status. Marks for students not enrolled
/// in the lesson's batch are skipped and reported, not errors.
pub async fn mark_attendance(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(lesson_id): Path<i64>,
    Json(payload): Json<MarkAttendanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.marks.is_empty() {
        return Err(AppError::BadRequest("No attendance marks given".to_string()));
    }

    let lesson = fetch_lesson(&pool, lesson_id).await?;
    let batch = fetch_batch(&pool, lesson.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let enrolled: Vec<i64> =
        sqlx::query_scalar("SELECT student_id FROM enrollments WHERE batch_id = $1")
            .bind(lesson.batch_id)
            .fetch_all(&pool)
            .await?;
    let enrolled: HashSet<i64> = enrolled.into_iter().collect();

    let now = Utc::now();
    let marker = claims.user_id();
    let mut marked = 0;
    let mut skipped = 0;

    let mut tx = pool.begin().await?;
    for mark in &payload.marks {
        if !enrolled.contains(&mark.student_id) {
            skipped += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO attendance (lesson_id, student_id, status, marked_at, marked_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (lesson_id, student_id) DO UPDATE SET
                status = EXCLUDED.status,
                marked_at = EXCLUDED.marked_at,
                marked_by = EXCLUDED.marked_by
            "#,
        )
        .bind(lesson_id)
        .bind(mark.student_id)
        .bind(mark.status)
        .bind(now)
        .bind(marker)
        .execute(&mut *tx)
        .await?;
        marked += 1;
    }
    tx.commit().await?;

    activity::record(
        &pool,
        marker,
        "lesson.attendance_marked",
        Some(ActivityTarget::Lesson(lesson_id)),
        json!({ "marked": marked, "skipped": skipped }),
        &headers,
    )
    .await;

    Ok(Json(json!({ "marked": marked, "skipped": skipped })))
}

/// Lists attendance records for a lesson, joined with student names.
pub async fn list_attendance(
    State(pool): State<PgPool>,
    Path(lesson_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_lesson(&pool, lesson_id).await?;

    let entries = sqlx::query_as::<_, AttendanceEntry>(
        "SELECT a.student_id, u.name, a.status, a.marked_at, a.marked_by \
         FROM attendance a JOIN users u ON u.id = a.student_id \
         WHERE a.lesson_id = $1 ORDER BY u.name",
    )
    .bind(lesson_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(entries))
}
