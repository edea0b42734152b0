use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::dto::shop_dto::{CreateShopItemPayload, PurchaseResponse};
use crate::error::{Error, Result};
use crate::models::shop::ShopItem;

#[derive(Debug, FromRow)]
struct LockedItem {
    price: i32,
    stock: Option<i32>,
    is_active: bool,
}

#[derive(Clone)]
pub struct ShopService {
    pool: PgPool,
}

impl ShopService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_items(&self) -> Result<Vec<ShopItem>> {
        let items = sqlx::query_as::<_, ShopItem>(
            "SELECT * FROM shop_items WHERE is_active ORDER BY price, title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn create_item(&self, payload: CreateShopItemPayload) -> Result<ShopItem> {
        let item = sqlx::query_as::<_, ShopItem>(
            r#"
            INSERT INTO shop_items (title, description, price, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(payload.price)
        .bind(payload.stock)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Adds `amount` coins, creating the wallet on first credit.
    pub async fn credit(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        amount: i64,
    ) -> Result<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO wallets (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;
        Ok(balance)
    }

    /// Buys one unit. Wallet and item rows are locked for the duration so
    /// concurrent purchases cannot overdraw or oversell.
    pub async fn purchase(&self, user_id: Uuid, item_id: Uuid) -> Result<PurchaseResponse> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, LockedItem>(
            "SELECT price, stock, is_active FROM shop_items WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|i| i.is_active)
        .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;

        check_stock(item.stock)?;

        let balance: i64 = sqlx::query_scalar(
            "SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        let remaining = check_funds(balance, item.price)?;

        sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(remaining)
            .execute(&mut *tx)
            .await?;

        if item.stock.is_some() {
            sqlx::query("UPDATE shop_items SET stock = stock - 1 WHERE id = $1")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        let purchase_id: Uuid = sqlx::query_scalar(
            "INSERT INTO purchases (user_id, item_id, price) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(item.price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, item_id = %item_id, price = item.price, "purchase completed");

        Ok(PurchaseResponse {
            purchase_id,
            item_id,
            price: item.price,
            balance: remaining,
        })
    }
}

fn check_stock(stock: Option<i32>) -> Result<()> {
    match stock {
        Some(n) if n <= 0 => Err(Error::Conflict("Item is out of stock".to_string())),
        _ => Ok(()),
    }
}

fn check_funds(balance: i64, price: i32) -> Result<i64> {
    let remaining = balance - price as i64;
    if remaining < 0 {
        return Err(Error::Conflict(format!(
            "Insufficient balance: need {}, have {}",
            price, balance
        )));
    }
    Ok(remaining)
}
