use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use super::catalog::CoursesResponse;
use super::{parse_course_id, validated, MessageResponse};
use crate::auth::kind::PrincipalKind;
use crate::errors::AppError;
use crate::middleware::auth_gate::AuthContext;
use crate::store::postgres::NewCourse;
use crate::AppState;

const MAX_PRICE: i64 = 150_000;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MakeCourseRequest {
    #[validate(length(min = 3, max = 35))]
    pub title: String,
    #[validate(length(min = 5, max = 100))]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "price_in_range"))]
    pub price: Decimal,
    #[validate(length(min = 5, max = 2048))]
    pub image_url: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdatePriceRequest {
    #[validate(length(min = 3, max = 50))]
    pub course_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "price_in_range"))]
    pub new_price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddInstructorRequest {
    #[validate(length(min = 3, max = 50))]
    pub course_id: String,
}

fn price_in_range(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || *price > Decimal::from(MAX_PRICE) {
        return Err(ValidationError::new("price_range"));
    }
    Ok(())
}

pub async fn make_course(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    payload: Result<Json<MakeCourseRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = validated(payload)?;

    let course = NewCourse {
        title: req.title,
        description: req.description,
        price: req.price,
        image_url: req.image_url,
    };
    let id = state.db.create_course(&course).await?;

    tracing::info!(admin = %ctx.principal_id, course = %id, "course created");
    Ok(MessageResponse::new(format!(
        "Course created; Course ID: {}",
        id
    )))
}

pub async fn update_price(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    payload: Result<Json<UpdatePriceRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = validated(payload)?;
    let course_id = parse_course_id(&req.course_id)?;

    if state.db.get_course(course_id).await?.is_none() {
        return Err(AppError::CourseNotFound(req.course_id));
    }
    if !state.db.is_instructor(ctx.principal_id, course_id).await? {
        return Err(AppError::NotInstructor(course_id));
    }
    if !state.db.update_course_price(course_id, req.new_price).await? {
        // Deleted between the lookup and the update.
        return Err(AppError::CourseNotFound(req.course_id));
    }

    Ok(MessageResponse::new(format!(
        "Price updated to: {}",
        req.new_price.normalize()
    )))
}

pub async fn add_instructor(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    payload: Result<Json<AddInstructorRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = validated(payload)?;
    let course_id = parse_course_id(&req.course_id)?;

    ensure_account(&state, &ctx).await?;
    if state.db.get_course(course_id).await?.is_none() {
        return Err(AppError::CourseNotFound(req.course_id));
    }
    if !state.db.add_instructor(ctx.principal_id, course_id).await? {
        return Err(AppError::AlreadyInstructor(course_id));
    }

    Ok(MessageResponse::new(format!(
        "You are now the instructor of {}",
        course_id
    )))
}

pub async fn my_courses(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<CoursesResponse>, AppError> {
    ensure_account(&state, &ctx).await?;
    let courses = state.db.courses_for_admin(ctx.principal_id).await?;
    Ok(Json(CoursesResponse { courses }))
}

async fn ensure_account(state: &AppState, ctx: &AuthContext) -> Result<(), AppError> {
    if state.db.account_exists(PrincipalKind::Admin, ctx.principal_id).await? {
        Ok(())
    } else {
        Err(anyhow::anyhow!("no admin account for verified principal {}", ctx.principal_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bounds() {
        assert!(price_in_range(&Decimal::ZERO).is_ok());
        assert!(price_in_range(&Decimal::from(MAX_PRICE)).is_ok());
        assert!(price_in_range(&Decimal::from(MAX_PRICE + 1)).is_err());
        assert!(price_in_range(&Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_make_course_accepts_numeric_price() {
        let body = r#"{"title":"Rust 101","description":"Ownership and borrowing","price":499,"imageUrl":"https://img/1.png"}"#;
        let req: MakeCourseRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.price, Decimal::from(499));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_price_rejects_out_of_range() {
        let body = r#"{"courseId":"abc","newPrice":200000}"#;
        let req: UpdatePriceRequest = serde_json::from_str(body).unwrap();
        let errs = req.validate().unwrap_err();
        assert_eq!(errs.field_errors().len(), 1);
    }
}
