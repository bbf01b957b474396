// src/handlers/dashboard.rs

use std::collections::HashMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        batch::{Batch, BatchResponse},
        quiz::Quiz,
        quiz_attempt::QuizAttempt,
        user::User,
    },
    scoring,
    utils::jwt::Claims,
};

/// Helper row joining a batch with its enrollment count.
#[derive(sqlx::FromRow)]
struct BatchRow {
    #[sqlx(flatten)]
    batch: Batch,
    students_count: i64,
}

/// The student dashboard: profile, enrolled batches with status text,
/// quizzes still pending, and the average score (one-decimal precision at
/// this call site).
///
/// Pending combines two independent predicates applied explicitly: batch
/// membership (the enrollment join below) and quiz availability
/// (`is_pending_for`). Neither check implies the other.
pub async fn get_dashboard(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, password, role, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let rows: Vec<BatchRow> = sqlx::query_as(
        "SELECT b.id, b.teacher_id, b.name, b.description, b.start_date, b.end_date, \
         b.max_students, b.is_active, b.created_at, COUNT(e2.student_id) AS students_count \
         FROM batches b \
         JOIN enrollments e ON e.batch_id = b.id AND e.student_id = $1 \
         LEFT JOIN enrollments e2 ON e2.batch_id = b.id \
         GROUP BY b.id ORDER BY b.id DESC",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let quizzes = sqlx::query_as::<_, Quiz>(
        "SELECT id, batch_id, teacher_id, title, description, start_time, end_time, \
         duration_minutes, total_marks, pass_marks, max_attempts, is_active, \
         randomize_questions, created_at FROM quizzes \
         WHERE is_active = TRUE \
         AND batch_id IN (SELECT batch_id FROM enrollments WHERE student_id = $1) \
         ORDER BY id DESC",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let my_attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT id, quiz_id, student_id, attempt_number, started_at, completed_at, score, \
         total_points, status FROM quiz_attempts WHERE student_id = $1",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let mut by_quiz: HashMap<i64, Vec<QuizAttempt>> = HashMap::new();
    for attempt in &my_attempts {
        by_quiz.entry(attempt.quiz_id).or_default().push(attempt.clone());
    }

    let now = Utc::now();
    let empty: Vec<QuizAttempt> = Vec::new();
    let pending: Vec<&Quiz> = quizzes
        .iter()
        .filter(|quiz| quiz.is_pending_for(now, by_quiz.get(&quiz.id).unwrap_or(&empty)))
        .collect();

    let batches: Vec<BatchResponse> = rows
        .into_iter()
        .map(|row| BatchResponse::from_batch(row.batch, row.students_count, now))
        .collect();

    Ok(Json(json!({
        "user": user,
        "batches": batches,
        "pending_quizzes": pending,
        "average_score": scoring::dashboard_average_percentage(&my_attempts),
    })))
}
