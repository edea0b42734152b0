use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShopItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: i32,
    pub stock: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
