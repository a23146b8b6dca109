use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("incorrect request format")]
    InvalidFormat(serde_json::Value),

    #[error("email already registered")]
    EmailTaken,

    #[error("course not found: {0}")]
    CourseNotFound(String),

    #[error("not an instructor of course {0}")]
    NotInstructor(Uuid),

    #[error("course {0} already purchased")]
    AlreadyPurchased(Uuid),

    #[error("already instructor of course {0}")]
    AlreadyInstructor(Uuid),

    #[error("logout could not be recorded")]
    LogoutFailed,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_format(detail: impl serde::Serialize) -> Self {
        AppError::InvalidFormat(serde_json::to_value(detail).unwrap_or_default())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::NotInstructor(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidFormat(_) | AppError::EmailTaken => StatusCode::FORBIDDEN,
            AppError::CourseNotFound(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyPurchased(_) | AppError::AlreadyInstructor(_) => StatusCode::CONFLICT,
            AppError::LogoutFailed | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Unauthorized => json!({ "msg": "Unauthorized" }),
            AppError::InvalidFormat(detail) => json!({
                "msg": "Incorrect Format",
                "error": detail,
            }),
            AppError::EmailTaken => json!({ "msg": "Sorry, this email already exists." }),
            AppError::CourseNotFound(id) => json!({
                "msg": format!("Unable to find the course with course ID: {}", id)
            }),
            AppError::NotInstructor(id) => json!({
                "msg": format!("Sorry you do not teach the course ID: {}", id)
            }),
            AppError::AlreadyPurchased(id) => json!({
                "msg": format!("You have already purchased the courseId: {}", id)
            }),
            AppError::AlreadyInstructor(id) => json!({
                "msg": format!("You are already the instructor of {}", id)
            }),
            AppError::LogoutFailed => json!({ "msg": "Server error, could not log you out" }),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                json!({ "msg": "Sorry server is facing error" })
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                json!({ "msg": "Sorry server is facing error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
