use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::dto::attempt_dto::{
    NavigateRequest, RecordAnswerRequest, RecordAnswerResponse, StartAttemptRequest,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<Uuid>,
    payload: Option<Json<StartAttemptRequest>>,
) -> Result<impl IntoResponse> {
    claims.require_role(&[Role::Student])?;
    let student_id = claims.user_id()?;
    let group_id = payload.and_then(|Json(p)| p.group_id);

    let started = state
        .attempt_service
        .start_attempt(lesson_id, student_id, group_id)
        .await?;
    Ok((StatusCode::CREATED, Json(started)))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let status = state
        .attempt_service
        .status(attempt_id, claims.user_id()?, claims.role()?)
        .await?;
    Ok(Json(status))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse> {
    state
        .attempt_service
        .record_answer(
            attempt_id,
            claims.user_id()?,
            payload.question_id,
            payload.answer,
        )
        .await?;
    Ok(Json(RecordAnswerResponse {
        saved: true,
        question_id: payload.question_id,
    }))
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<NavigateRequest>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .navigate_to(attempt_id, claims.user_id()?, payload.index)
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn finish(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .attempt_service
        .finish(attempt_id, claims.user_id()?)
        .await?;
    tracing::info!(
        attempt_id = %attempt_id,
        score = outcome.score,
        passed = outcome.passed,
        "attempt finished"
    );
    Ok(Json(outcome))
}
