use std::sync::Arc;

use sqlx::PgPool;

use crate::dto::auth_dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::error::{Error, Result};
use crate::models::user::{Role, User};
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::token::issue_access_token;

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt_secret: Arc<str>,
    ttl_hours: i64,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt_secret: &str, ttl_hours: i64) -> Self {
        Self {
            pool,
            jwt_secret: Arc::from(jwt_secret),
            ttl_hours,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn issue_token(&self, user: &User) -> Result<AuthResponse> {
        let role = user.role.parse::<Role>()?;
        let (token, expires_at) =
            issue_access_token(user.id, role, &self.jwt_secret, self.ttl_hours)?;
        Ok(AuthResponse {
            token,
            user_id: user.id,
            role: role.as_str().to_string(),
            expires_at,
        })
    }

    /// Students and teachers may sign themselves up. Admins are seeded.
    pub async fn register(&self, payload: RegisterRequest) -> Result<AuthResponse> {
        let role = match payload.role.as_deref() {
            None => Role::Student,
            Some(raw) => raw.parse::<Role>()?,
        };
        if role == Role::Admin {
            return Err(Error::Forbidden("Admin accounts cannot be self-registered".to_string()));
        }

        let email = payload.email.trim().to_lowercase();
        let password_hash = hash_password(&payload.password)?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role, group_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(payload.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(payload.group_id)
        .fetch_one(&mut *tx)
        .await;

        let user = match inserted {
            Ok(user) => user,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(Error::Conflict("Email is already registered".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = role.as_str(), "user registered");
        self.issue_token(&user)
    }

    pub async fn login(&self, payload: LoginRequest) -> Result<AuthResponse> {
        let email = payload.email.trim().to_lowercase();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let invalid = || Error::Unauthorized("Invalid email or password".to_string());
        let user = user.ok_or_else(invalid)?;
        if !user.is_active {
            return Err(Error::Forbidden("Account is disabled".to_string()));
        }
        if !verify_password(&payload.password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "failed login");
            return Err(invalid());
        }

        self.issue_token(&user)
    }
}
