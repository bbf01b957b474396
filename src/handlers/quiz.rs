// src/handlers/quiz.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{activity, batch::fetch_batch, can_manage, require_staff},
    models::{
        activity_log::ActivityTarget,
        question::{CreateQuestionRequest, PublicQuestion, Question, UpdateQuestionRequest},
        quiz::{CreateQuizRequest, Quiz, UpdateQuizRequest},
        quiz_attempt::QuizAttempt,
    },
    scoring::{self, GradeScale},
    utils::{html::clean_html, jwt::Claims},
};

const QUIZ_COLUMNS: &str = "id, batch_id, teacher_id, title, description, start_time, end_time, \
                            duration_minutes, total_marks, pass_marks, max_attempts, is_active, \
                            randomize_questions, created_at";

const QUESTION_COLUMNS: &str =
    "id, quiz_id, question_type, question_text, options, correct_answer, marks, sort_order";

/// Lists a batch's quizzes.
pub async fn list_batch_quizzes(
    State(pool): State<PgPool>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_batch(&pool, batch_id).await?;

    let quizzes = sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE batch_id = $1 ORDER BY id DESC"
    ))
    .bind(batch_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Retrieves a single quiz.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    Ok(Json(quiz))
}

/// Creates a quiz in a batch the caller manages. `total_marks` starts at
/// zero and tracks the question bank as questions are added.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&claims)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let (Some(start), Some(end)) = (payload.start_time, payload.end_time) {
        if end < start {
            return Err(AppError::BadRequest(
                "end_time must not be before start_time".to_string(),
            ));
        }
    }

    let batch = fetch_batch(&pool, payload.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        "INSERT INTO quizzes (batch_id, teacher_id, title, description, start_time, end_time, \
         duration_minutes, pass_marks, max_attempts, is_active, randomize_questions) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {QUIZ_COLUMNS}"
    ))
    .bind(payload.batch_id)
    .bind(batch.teacher_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.description))
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.duration_minutes)
    .bind(payload.pass_marks)
    .bind(payload.max_attempts)
    .bind(payload.is_active)
    .bind(payload.randomize_questions)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    activity::record(
        &pool,
        claims.user_id(),
        "quiz.created",
        Some(ActivityTarget::Quiz(quiz.id)),
        json!({ "batch_id": quiz.batch_id, "title": quiz.title }),
        &headers,
    )
    .await;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Updates a quiz. Fields absent from the payload are left untouched.
/// `pass_marks` may not exceed the current question-bank total.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    if let Some(pass_marks) = payload.pass_marks {
        if pass_marks < 0 || pass_marks > quiz.total_marks {
            return Err(AppError::BadRequest(
                "pass_marks must be between 0 and total_marks".to_string(),
            ));
        }
    }

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.start_time.is_none()
        && payload.end_time.is_none()
        && payload.duration_minutes.is_none()
        && payload.pass_marks.is_none()
        && payload.max_attempts.is_none()
        && payload.is_active.is_none()
        && payload.randomize_questions.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE quizzes SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }
    if let Some(start_time) = payload.start_time {
        separated.push("start_time = ");
        separated.push_bind_unseparated(start_time);
    }
    if let Some(end_time) = payload.end_time {
        separated.push("end_time = ");
        separated.push_bind_unseparated(end_time);
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }
    if let Some(pass_marks) = payload.pass_marks {
        separated.push("pass_marks = ");
        separated.push_bind_unseparated(pass_marks);
    }
    if let Some(max_attempts) = payload.max_attempts {
        separated.push("max_attempts = ");
        separated.push_bind_unseparated(max_attempts);
    }
    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }
    if let Some(randomize_questions) = payload.randomize_questions {
        separated.push("randomize_questions = ");
        separated.push_bind_unseparated(randomize_questions);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a quiz and its question bank. Refused once attempts exist:
/// attempt history is never discarded implicitly.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    let attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await?;
    if attempts > 0 {
        return Err(AppError::Conflict(
            "Quiz has recorded attempts and cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    activity::record(
        &pool,
        claims.user_id(),
        "quiz.deleted",
        Some(ActivityTarget::Quiz(id)),
        json!({ "title": quiz.title }),
        &headers,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Lists a quiz's questions with answer keys. Manager only.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 ORDER BY sort_order, id"
    ))
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}

/// Adds a question to a quiz and brings `total_marks` back in line with
/// the question bank.
pub async fn add_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz = fetch_quiz(&pool, id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    let mut tx = pool.begin().await?;

    let question = sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (quiz_id, question_type, question_text, options, correct_answer, marks, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.question_type)
    .bind(clean_html(&payload.question_text))
    .bind(sqlx::types::Json(&payload.options))
    .bind(&payload.correct_answer)
    .bind(payload.marks)
    .bind(payload.sort_order)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    sync_total_marks(&mut tx, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by ID.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id: i64 = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let quiz = fetch_quiz(&pool, quiz_id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    if let Some(marks) = payload.marks {
        if marks < 1 {
            return Err(AppError::BadRequest("marks must be positive".to_string()));
        }
    }

    if payload.question_text.is_none()
        && payload.options.is_none()
        && payload.correct_answer.is_none()
        && payload.marks.is_none()
        && payload.sort_order.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(question_text) = payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(clean_html(&question_text));
    }
    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(sqlx::types::Json(options));
    }
    if let Some(correct_answer) = payload.correct_answer {
        separated.push("correct_answer = ");
        separated.push_bind_unseparated(correct_answer);
    }
    if let Some(marks) = payload.marks {
        separated.push("marks = ");
        separated.push_bind_unseparated(marks);
    }
    if let Some(sort_order) = payload.sort_order {
        separated.push("sort_order = ");
        separated.push_bind_unseparated(sort_order);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&mut *tx).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    sync_total_marks(&mut tx, quiz_id).await?;
    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id: i64 = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let quiz = fetch_quiz(&pool, quiz_id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sync_total_marks(&mut tx, quiz_id).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the question paper for a student about to take the quiz:
/// answer keys stripped, shuffled when the quiz randomizes.
///
/// Access requires enrollment in the quiz's batch (a membership check) AND
/// an open, active quiz (an availability check). The two are applied
/// explicitly here; neither predicate implies the other.
pub async fn get_paper(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    let student_id = claims.user_id();

    let enrolled: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE batch_id = $1 AND student_id = $2)",
    )
    .bind(quiz.batch_id)
    .bind(student_id)
    .fetch_one(&pool)
    .await?;
    if !enrolled {
        return Err(AppError::Forbidden(
            "You are not enrolled in this quiz's batch".to_string(),
        ));
    }

    let now = Utc::now();
    if !quiz.is_active || !quiz.has_started(now) || quiz.has_closed(now) {
        return Err(AppError::BadRequest("Quiz is not open".to_string()));
    }

    let order = if quiz.randomize_questions {
        "RANDOM()"
    } else {
        "sort_order, id"
    };
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 ORDER BY {order}"
    ))
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let paper: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();
    Ok(Json(paper))
}

/// Aggregate statistics over a quiz's attempts. Manager only.
pub async fn quiz_statistics(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, id).await?;
    if !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("You do not manage this quiz".to_string()));
    }

    let attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT id, quiz_id, student_id, attempt_number, started_at, completed_at, score, \
         total_points, status FROM quiz_attempts WHERE quiz_id = $1",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let submitted = attempts.iter().filter(|a| a.is_submitted()).count();
    let students: HashSet<i64> = attempts.iter().map(|a| a.student_id).collect();
    let scale = GradeScale::default();

    Ok(Json(json!({
        "quiz_id": id,
        "attempts": attempts.len(),
        "submitted": submitted,
        "students": students.len(),
        "average_percentage": scoring::average_percentage(&attempts),
        "pass_rate": scoring::pass_rate(&attempts, quiz.pass_marks),
        "distribution": scoring::score_distribution(&attempts, &scale),
    })))
}

/// Recomputes a quiz's `total_marks` from its question bank so the stored
/// total always equals the sum of question marks.
async fn sync_total_marks(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    quiz_id: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE quizzes SET total_marks = \
         (SELECT COALESCE(SUM(marks), 0) FROM questions WHERE quiz_id = $1) WHERE id = $1",
    )
    .bind(quiz_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_quiz(pool: &PgPool, id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))
}
