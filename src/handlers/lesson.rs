// src/handlers/lesson.rs

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
        lesson::{CreateLessonRequest, Lesson, LessonResponse, LessonStatus, UpdateLessonRequest},
    },
    utils::{html::clean_html, jwt::Claims},
};

const LESSON_COLUMNS: &str = "id, batch_id, title, description, meeting_link, scheduled_at, \
                              duration_minutes, status, created_at";

/// Lists a batch's lessons in schedule order, each with its derived
/// end time and effective status.
pub async fn list_batch_lessons(
    State(pool): State<PgPool>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_batch(&pool, batch_id).await?;

    let lessons = sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lessons WHERE batch_id = $1 ORDER BY scheduled_at"
    ))
    .bind(batch_id)
    .fetch_all(&pool)
    .await?;

    let now = Utc::now();
    let lessons: Vec<LessonResponse> = lessons
        .into_iter()
        .map(|lesson| LessonResponse::from_lesson(lesson, now))
        .collect();

    Ok(Json(lessons))
}

/// Retrieves a single lesson.
pub async fn get_lesson(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = fetch_lesson(&pool, id).await?;
    Ok(Json(LessonResponse::from_lesson(lesson, Utc::now())))
}

/// Schedules a new lesson in a batch the caller manages.
pub async fn create_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&claims)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let batch = fetch_batch(&pool, payload.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        "INSERT INTO lessons (batch_id, title, description, meeting_link, scheduled_at, duration_minutes) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {LESSON_COLUMNS}"
    ))
    .bind(payload.batch_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.description))
    .bind(&payload.meeting_link)
    .bind(payload.scheduled_at)
    .bind(payload.duration_minutes)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create lesson: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    activity::record(
        &pool,
        claims.user_id(),
        "lesson.created",
        Some(ActivityTarget::Lesson(lesson.id)),
        json!({ "batch_id": lesson.batch_id, "title": lesson.title }),
        &headers,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(LessonResponse::from_lesson(lesson, Utc::now())),
    ))
}

/// Updates a lesson. Fields absent from the payload are left untouched.
pub async fn update_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = fetch_lesson(&pool, id).await?;
    let batch = fetch_batch(&pool, lesson.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    if let Some(duration) = payload.duration_minutes {
        if duration < 1 {
            return Err(AppError::BadRequest(
                "duration_minutes must be positive".to_string(),
            ));
        }
    }

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.meeting_link.is_none()
        && payload.scheduled_at.is_none()
        && payload.duration_minutes.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE lessons SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }
    if let Some(meeting_link) = payload.meeting_link {
        separated.push("meeting_link = ");
        separated.push_bind_unseparated(meeting_link);
    }
    if let Some(scheduled_at) = payload.scheduled_at {
        separated.push("scheduled_at = ");
        separated.push_bind_unseparated(scheduled_at);
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update lesson: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Cancels a lesson. Cancellation is the one explicit status transition;
/// everything else is derived from the clock.
pub async fn cancel_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = fetch_lesson(&pool, id).await?;
    let batch = fetch_batch(&pool, lesson.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    sqlx::query("UPDATE lessons SET status = $1 WHERE id = $2")
        .bind(LessonStatus::Cancelled)
        .bind(id)
        .execute(&pool)
        .await?;

    activity::record(
        &pool,
        claims.user_id(),
        "lesson.cancelled",
        Some(ActivityTarget::Lesson(id)),
        json!({ "title": lesson.title }),
        &headers,
    )
    .await;

    Ok(StatusCode::OK)
}

/// Deletes a lesson and its attendance records.
pub async fn delete_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = fetch_lesson(&pool, id).await?;
    let batch = fetch_batch(&pool, lesson.batch_id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete lesson: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Lesson not found".to_string()));
    }

    activity::record(
        &pool,
        claims.user_id(),
        "lesson.deleted",
        Some(ActivityTarget::Lesson(id)),
        json!({ "title": lesson.title }),
        &headers,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_lesson(pool: &PgPool, id: i64) -> Result<Lesson, AppError> {
    sqlx::query_as::<_, Lesson>(&format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))
}
