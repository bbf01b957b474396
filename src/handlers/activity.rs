// src/handlers/activity.rs

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};

use crate::{
    error::AppError,
    models::activity_log::{ActivityListParams, ActivityLog, ActivityTarget},
};

/// Records one activity entry. Best-effort: a failed write is traced and
/// swallowed so it can never fail the request that triggered it.
pub async fn record(
    pool: &PgPool,
    user_id: i64,
    action: &str,
    target: Option<ActivityTarget>,
    data: serde_json::Value,
    headers: &HeaderMap,
) {
    let (target_type, target_id) = match target {
        Some(t) => (Some(t.kind()), Some(t.id())),
        None => (None, None),
    };
    let (ip_address, user_agent) = client_meta(headers);

    let result = sqlx::query(
        r#"
        INSERT INTO activity_logs (user_id, action, target_type, target_id, data, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(SqlJson(data))
    .bind(ip_address)
    .bind(user_agent)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to record activity '{}': {:?}", action, e);
    }
}

/// Extracts the client IP (first X-Forwarded-For hop) and user agent.
fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(500).collect());

    (ip_address, user_agent)
}

/// Lists activity entries, newest first, with optional filters.
/// Admin only. The log is append-only; there is no mutation surface.
pub async fn list_activity(
    State(pool): State<PgPool>,
    Query(params): Query<ActivityListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, user_id, action, target_type, target_id, data, ip_address, user_agent, created_at
         FROM activity_logs WHERE 1 = 1",
    );

    if let Some(user_id) = params.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(action) = params.action {
        builder.push(" AND action = ");
        builder.push_bind(action);
    }
    if let Some(target_type) = params.target_type {
        builder.push(" AND target_type = ");
        builder.push_bind(target_type);
    }

    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(limit);

    let entries: Vec<ActivityLog> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list activity: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(entries))
}
