use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::course_dto::{CreateCoursePayload, CreateLessonPayload};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_courses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let courses = state.course_service.list_courses(claims.is_staff()).await?;
    Ok(Json(courses))
}

#[axum::debug_handler]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCoursePayload>,
) -> Result<impl IntoResponse> {
    claims.require_role(&[Role::Teacher, Role::Admin])?;
    payload.validate()?;
    let course = state
        .course_service
        .create_course(payload, claims.user_id()?)
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

#[axum::debug_handler]
pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state.course_service.get_course_detail(id).await?;
    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn create_lesson(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateLessonPayload>,
) -> Result<impl IntoResponse> {
    let role = claims.require_role(&[Role::Teacher, Role::Admin])?;
    payload.validate()?;
    let lesson = state
        .course_service
        .create_lesson(id, payload, claims.user_id()?, role)
        .await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

#[axum::debug_handler]
pub async fn my_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let progress = state
        .course_service
        .student_progress(id, claims.user_id()?)
        .await?;
    Ok(Json(progress))
}
