use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;
use validator::Validate;

use super::catalog::CoursesResponse;
use super::{parse_course_id, validated, MessageResponse};
use crate::auth::kind::PrincipalKind;
use crate::errors::AppError;
use crate::middleware::auth_gate::AuthContext;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BuyCourseRequest {
    #[validate(length(min = 3, max = 50))]
    pub course_id: String,
}

pub async fn buy_course(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    payload: Result<Json<BuyCourseRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = validated(payload)?;
    let course_id = parse_course_id(&req.course_id)?;

    ensure_account(&state, &ctx).await?;
    if state.db.get_course(course_id).await?.is_none() {
        return Err(AppError::CourseNotFound(req.course_id));
    }
    if !state.db.purchase_course(ctx.principal_id, course_id).await? {
        return Err(AppError::AlreadyPurchased(course_id));
    }

    tracing::info!(user = %ctx.principal_id, course = %course_id, "course purchased");
    Ok(MessageResponse::new(format!(
        "You purchased the courseId: {}",
        course_id
    )))
}

pub async fn my_courses(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<CoursesResponse>, AppError> {
    ensure_account(&state, &ctx).await?;
    let courses = state.db.courses_for_user(ctx.principal_id).await?;
    Ok(Json(CoursesResponse { courses }))
}

/// A verified token whose account has since disappeared is a server-side
/// inconsistency, not a client error.
async fn ensure_account(state: &AppState, ctx: &AuthContext) -> Result<(), AppError> {
    if state.db.account_exists(PrincipalKind::User, ctx.principal_id).await? {
        Ok(())
    } else {
        Err(anyhow::anyhow!("no user account for verified principal {}", ctx.principal_id).into())
    }
}
