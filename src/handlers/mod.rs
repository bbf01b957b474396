// src/handlers/mod.rs

pub mod activity;
pub mod admin;
pub mod attempt;
pub mod attendance;
pub mod auth;
pub mod batch;
pub mod dashboard;
pub mod lesson;
pub mod quiz;

use crate::{error::AppError, utils::jwt::Claims};

/// Whether the authenticated user may manage a resource owned by `owner_id`.
/// Admins may manage anything; teachers only their own.
pub(crate) fn can_manage(claims: &Claims, owner_id: i64) -> bool {
    claims.role == "admin" || claims.user_id() == owner_id
}

/// Guards resource-creating endpoints that are staff-only.
pub(crate) fn require_staff(claims: &Claims) -> Result<(), AppError> {
    if claims.role == "teacher" || claims.role == "admin" {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Teacher or admin role required".to_string(),
        ))
    }
}
