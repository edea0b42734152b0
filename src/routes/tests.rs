use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::test_dto::{AttemptListQuery, CreateTestPayload};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<Uuid>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    let role = claims.require_role(&[Role::Teacher, Role::Admin])?;
    payload.validate()?;
    let created = state
        .test_service
        .create_test(lesson_id, payload, claims.user_id()?, role)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
    Query(query): Query<AttemptListQuery>,
) -> Result<impl IntoResponse> {
    let role = claims.require_role(&[Role::Teacher, Role::Admin])?;
    let page = state
        .test_service
        .list_attempts(test_id, query, claims.user_id()?, role)
        .await?;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    claims.require_role(&[Role::Teacher, Role::Admin])?;
    let test = state.test_service.get_test_by_id(test_id).await?;
    Ok(Json(test))
}
