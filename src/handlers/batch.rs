// src/handlers/batch.rs

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
    handlers::{activity, can_manage, require_staff},
    models::{
        activity_log::ActivityTarget,
        batch::{
            Batch, BatchResponse, CreateBatchRequest, EnrollmentOutcome, RemovalOutcome,
            UpdateBatchRequest,
        },
        enrollment::{EnrollRequest, RosterEntry},
        user::{User, UserRole},
    },
    utils::{html::clean_html, jwt::Claims},
};

const BATCH_COLUMNS: &str =
    "id, teacher_id, name, description, start_date, end_date, max_students, is_active, created_at";

/// Helper row joining a batch with its enrollment count.
#[derive(sqlx::FromRow)]
struct BatchRow {
    #[sqlx(flatten)]
    batch: Batch,
    students_count: i64,
}

/// Lists batches visible to the caller: admins see everything, teachers
/// their own, students the ones they are enrolled in. Each entry carries
/// the read-only derived fields (count, fullness, status/duration text).
pub async fn list_batches(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT b.id, b.teacher_id, b.name, b.description, b.start_date, b.end_date, \
         b.max_students, b.is_active, b.created_at, COUNT(e.student_id) AS students_count \
         FROM batches b LEFT JOIN enrollments e ON e.batch_id = b.id",
    );

    match claims.role.as_str() {
        "teacher" => {
            builder.push(" WHERE b.teacher_id = ");
            builder.push_bind(claims.user_id());
        }
        "student" => {
            builder.push(" WHERE b.id IN (SELECT batch_id FROM enrollments WHERE student_id = ");
            builder.push_bind(claims.user_id());
            builder.push(")");
        }
        _ => {}
    }

    builder.push(" GROUP BY b.id ORDER BY b.id DESC");

    let rows: Vec<BatchRow> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list batches: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let now = Utc::now();
    let batches: Vec<BatchResponse> = rows
        .into_iter()
        .map(|row| BatchResponse::from_batch(row.batch, row.students_count, now))
        .collect();

    Ok(Json(batches))
}

/// Retrieves a single batch with derived fields.
pub async fn get_batch(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let row = sqlx::query_as::<_, BatchRow>(
        "SELECT b.id, b.teacher_id, b.name, b.description, b.start_date, b.end_date, \
         b.max_students, b.is_active, b.created_at, COUNT(e.student_id) AS students_count \
         FROM batches b LEFT JOIN enrollments e ON e.batch_id = b.id \
         WHERE b.id = $1 GROUP BY b.id",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Batch not found".to_string()))?;

    Ok(Json(BatchResponse::from_batch(
        row.batch,
        row.students_count,
        Utc::now(),
    )))
}

/// Creates a new batch owned by the calling teacher.
pub async fn create_batch(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<CreateBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&claims)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end < start {
            return Err(AppError::BadRequest(
                "end_date must not be before start_date".to_string(),
            ));
        }
    }

    let batch = sqlx::query_as::<_, Batch>(&format!(
        "INSERT INTO batches (teacher_id, name, description, start_date, end_date, max_students, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {BATCH_COLUMNS}"
    ))
    .bind(claims.user_id())
    .bind(&payload.name)
    .bind(clean_html(&payload.description))
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.max_students)
    .bind(payload.is_active)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create batch: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    activity::record(
        &pool,
        claims.user_id(),
        "batch.created",
        Some(ActivityTarget::Batch(batch.id)),
        json!({ "name": batch.name }),
        &headers,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse::from_batch(batch, 0, Utc::now())),
    ))
}

/// Updates a batch. Fields absent from the payload are left untouched.
pub async fn update_batch(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let existing = fetch_batch(&pool, id).await?;
    if !can_manage(&claims, existing.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    // Validate the date window the update would leave behind.
    let start = payload.start_date.or(existing.start_date);
    let end = payload.end_date.or(existing.end_date);
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::BadRequest(
                "end_date must not be before start_date".to_string(),
            ));
        }
    }

    if payload.name.is_none()
        && payload.description.is_none()
        && payload.start_date.is_none()
        && payload.end_date.is_none()
        && payload.max_students.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE batches SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }
    if let Some(start_date) = payload.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }
    if let Some(end_date) = payload.end_date {
        separated.push("end_date = ");
        separated.push_bind_unseparated(end_date);
    }
    if let Some(max_students) = payload.max_students {
        separated.push("max_students = ");
        separated.push_bind_unseparated(max_students);
    }
    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update batch: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a batch. Enrollment links are detached in the same transaction,
/// but deletion is refused while dependent lessons or quizzes exist.
pub async fn delete_batch(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let batch = fetch_batch(&pool, id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let dependents: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM lessons WHERE batch_id = $1) \
         + (SELECT COUNT(*) FROM quizzes WHERE batch_id = $1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if dependents > 0 {
        return Err(AppError::Conflict(
            "Batch still has lessons or quizzes; delete them first".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM enrollments WHERE batch_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM batches WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    activity::record(
        &pool,
        claims.user_id(),
        "batch.deleted",
        Some(ActivityTarget::Batch(id)),
        json!({ "name": batch.name }),
        &headers,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Enrolls a student into a batch.
///
/// The capacity check and the insert run inside one transaction holding a
/// row lock on the batch, so two concurrent requests cannot both pass the
/// check. Enrolling an already-enrolled student is an idempotent no-op.
pub async fn enroll_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let batch = sqlx::query_as::<_, Batch>(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Batch not found".to_string()))?;

    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let student = sqlx::query_as::<_, User>(
        "SELECT id, name, email, password, role, created_at FROM users WHERE id = $1",
    )
    .bind(payload.student_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Student not found".to_string()))?;

    if student.role != UserRole::Student {
        return Err(AppError::BadRequest(
            "Only student accounts can be enrolled".to_string(),
        ));
    }

    let enrolled_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE batch_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

    let already_enrolled: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE batch_id = $1 AND student_id = $2)",
    )
    .bind(id)
    .bind(payload.student_id)
    .fetch_one(&mut *tx)
    .await?;

    let outcome = batch.enrollment_decision(enrolled_count, already_enrolled);

    let students_count = if outcome.accepted() {
        sqlx::query("INSERT INTO enrollments (batch_id, student_id) VALUES ($1, $2)")
            .bind(id)
            .bind(payload.student_id)
            .execute(&mut *tx)
            .await?;
        enrolled_count + 1
    } else {
        enrolled_count
    };

    tx.commit().await?;

    if outcome.accepted() {
        activity::record(
            &pool,
            claims.user_id(),
            "batch.student_enrolled",
            Some(ActivityTarget::Batch(id)),
            json!({ "student_id": payload.student_id }),
            &headers,
        )
        .await;
    }

    let status = match outcome {
        EnrollmentOutcome::Enrolled => StatusCode::CREATED,
        EnrollmentOutcome::AlreadyEnrolled => StatusCode::OK,
        EnrollmentOutcome::BatchInactive | EnrollmentOutcome::BatchFull => StatusCode::CONFLICT,
    };

    Ok((
        status,
        Json(json!({
            "outcome": outcome,
            "enrolled": outcome.accepted(),
            "students_count": students_count,
        })),
    ))
}

/// Removes a student from a batch. Removing a non-member reports
/// `not_enrolled` rather than failing.
pub async fn unenroll_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path((id, student_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let batch = fetch_batch(&pool, id).await?;
    if !can_manage(&claims, batch.teacher_id) {
        return Err(AppError::Forbidden(
            "You do not manage this batch".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM enrollments WHERE batch_id = $1 AND student_id = $2")
        .bind(id)
        .bind(student_id)
        .execute(&pool)
        .await?;

    let outcome = batch.removal_decision(result.rows_affected() > 0);

    if result.rows_affected() > 0 {
        activity::record(
            &pool,
            claims.user_id(),
            "batch.student_removed",
            Some(ActivityTarget::Batch(id)),
            json!({ "student_id": student_id }),
            &headers,
        )
        .await;
    }

    let status = match outcome {
        RemovalOutcome::Removed => StatusCode::OK,
        RemovalOutcome::NotEnrolled => StatusCode::NOT_FOUND,
    };

    Ok((status, Json(json!({ "outcome": outcome }))))
}

/// Lists the students enrolled in a batch.
pub async fn list_students(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    // Existence check keeps an empty roster distinguishable from a missing batch.
    fetch_batch(&pool, id).await?;

    let roster = sqlx::query_as::<_, RosterEntry>(
        "SELECT e.student_id, u.name, u.email, e.enrolled_at \
         FROM enrollments e JOIN users u ON u.id = e.student_id \
         WHERE e.batch_id = $1 ORDER BY e.enrolled_at",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(roster))
}

pub(crate) async fn fetch_batch(pool: &PgPool, id: i64) -> Result<Batch, AppError> {
    sqlx::query_as::<_, Batch>(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Batch not found".to_string()))
}
