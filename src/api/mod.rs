use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRef},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::kind::PrincipalKind;
use crate::errors::AppError;
use crate::middleware::auth_gate::{require_principal, AuthGate};
use crate::revocation::service::RevocationService;
use crate::AppState;

pub mod account;
pub mod admin;
pub mod catalog;
pub mod user;

/// Build the public API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let user_gate = AuthGate::new(
        PrincipalKind::User,
        state.codec.clone(),
        state.revocations.clone(),
    );
    let admin_gate = AuthGate::new(
        PrincipalKind::Admin,
        state.codec.clone(),
        state.revocations.clone(),
    );

    Router::new()
        .nest("/user", user_router(user_gate))
        .nest("/admin", admin_router(admin_gate))
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn user_router(gate: AuthGate) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/logout", post(account::logout))
        .route("/buy-course", post(user::buy_course))
        .route("/my-courses", get(user::my_courses))
        .route("/courses", get(catalog::list_courses))
        .route_layer(middleware::from_fn_with_state(gate, require_principal));

    Router::new()
        .route("/signup", post(account::signup))
        .route("/login", post(account::login))
        .merge(protected)
        .layer(Extension(PrincipalKind::User))
}

fn admin_router(gate: AuthGate) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/logout", post(account::logout))
        .route("/make-course", post(admin::make_course))
        .route("/update-price", put(admin::update_price))
        .route("/add-instructor", post(admin::add_instructor))
        .route("/my-courses", get(admin::my_courses))
        .route("/courses", get(catalog::list_courses))
        .route_layer(middleware::from_fn_with_state(gate, require_principal));

    Router::new()
        .route("/signup", post(account::signup))
        .route("/login", post(account::login))
        .merge(protected)
        .layer(Extension(PrincipalKind::Admin))
}

impl FromRef<Arc<AppState>> for RevocationService {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.revocations.clone()
    }
}

// -- Shared Request Plumbing --

/// `{"msg": "..."}`, the body of every non-data response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { msg: msg.into() })
    }
}

/// Unwrap a JSON body and run its validation rules. Both malformed JSON
/// and rule violations answer `403 Incorrect Format`.
pub(crate) fn validated<T: Validate>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let Json(body) = payload.map_err(|rejection| AppError::invalid_format(rejection.body_text()))?;
    body.validate().map_err(AppError::invalid_format)?;
    Ok(body)
}

/// Course ids are UUIDs; anything else cannot name a course.
pub(crate) fn parse_course_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::CourseNotFound(raw.to_string()))
}
