use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateShopItemPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: i32,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletResponse {
    pub user_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResponse {
    pub purchase_id: Uuid,
    pub item_id: Uuid,
    pub price: i32,
    pub balance: i64,
}
