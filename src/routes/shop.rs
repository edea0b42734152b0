use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::shop_dto::{CreateShopItemPayload, WalletResponse};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_items(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let items = state.shop_service.list_items().await?;
    Ok(Json(items))
}

#[axum::debug_handler]
pub async fn create_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateShopItemPayload>,
) -> Result<impl IntoResponse> {
    claims.require_role(&[Role::Teacher, Role::Admin])?;
    payload.validate()?;
    let item = state.shop_service.create_item(payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[axum::debug_handler]
pub async fn wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let user_id = claims.user_id()?;
    let balance = state.shop_service.balance(user_id).await?;
    Ok(Json(WalletResponse { user_id, balance }))
}

#[axum::debug_handler]
pub async fn purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let receipt = state
        .shop_service
        .purchase(claims.user_id()?, item_id)
        .await?;
    Ok(Json(receipt))
}
