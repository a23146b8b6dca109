use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::AppError;
use crate::store::postgres::{CatalogRow, CourseRow};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub courses: Vec<CatalogRow>,
}

#[derive(Debug, Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<CourseRow>,
}

/// `GET /courses`: the whole catalog, open to any signed-in principal.
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogResponse>, AppError> {
    let courses = state.db.list_catalog().await?;
    Ok(Json(CatalogResponse { courses }))
}
