use sqlx::PgPool;
use uuid::Uuid;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::Result;
use crate::services::attempt_runner::FinalizedEvent;
use crate::services::shop_service::ShopService;

/// Pays coins for passed tests, at most once per student and lesson.
#[derive(Clone)]
pub struct RewardService {
    pool: PgPool,
    coins_per_pass: i32,
}

impl RewardService {
    pub fn new(pool: PgPool, coins_per_pass: i32) -> Self {
        Self {
            pool,
            coins_per_pass,
        }
    }

    /// Returns the amount credited, zero when nothing was owed.
    pub async fn handle(&self, event: &FinalizedEvent) -> Result<i32> {
        if !event.passed || self.coins_per_pass <= 0 {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO rewards (student_id, lesson_id, attempt_id, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(event.student_id)
        .bind(event.lesson_id)
        .bind(event.attempt_id)
        .bind(self.coins_per_pass)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        let balance = ShopService::credit(&mut tx, event.student_id, self.coins_per_pass as i64).await?;
        tx.commit().await?;

        tracing::info!(
            student_id = %event.student_id,
            lesson_id = %event.lesson_id,
            amount = self.coins_per_pass,
            balance,
            "test reward credited"
        );
        Ok(self.coins_per_pass)
    }

    /// Pays every passed, stored attempt whose student and lesson have no
    /// reward yet. Returns how many rewards were created.
    pub async fn reconcile(&self) -> Result<usize> {
        if self.coins_per_pass <= 0 {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let paid: Vec<Uuid> = sqlx::query_scalar(
            r#"
            WITH owed AS (
                SELECT DISTINCT ON (a.student_id, t.lesson_id)
                       a.student_id, t.lesson_id, a.id AS attempt_id
                FROM attempts a
                JOIN tests t ON t.id = a.test_id
                WHERE a.completed_at IS NOT NULL
                  AND a.score >= t.passing_score
                  AND NOT EXISTS (
                      SELECT 1 FROM rewards r
                      WHERE r.student_id = a.student_id AND r.lesson_id = t.lesson_id
                  )
                ORDER BY a.student_id, t.lesson_id, a.completed_at
            )
            INSERT INTO rewards (student_id, lesson_id, attempt_id, amount)
            SELECT student_id, lesson_id, attempt_id, $1 FROM owed
            ON CONFLICT (student_id, lesson_id) DO NOTHING
            RETURNING student_id
            "#,
        )
        .bind(self.coins_per_pass)
        .fetch_all(&mut *tx)
        .await?;

        for student_id in &paid {
            ShopService::credit(&mut tx, *student_id, self.coins_per_pass as i64).await?;
        }
        tx.commit().await?;

        if !paid.is_empty() {
            tracing::info!(rewards = paid.len(), "owed test rewards reconciled");
        }
        Ok(paid.len())
    }

    /// Settles rewards missed while the worker was down, then consumes
    /// finalized attempts until the sender side is dropped.
    pub async fn run(self, mut rx: broadcast::Receiver<FinalizedEvent>) {
        self.reconcile_logged().await;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle(&event).await {
                        tracing::error!(
                            attempt_id = %event.attempt_id,
                            error = %e,
                            "failed to credit test reward"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "reward worker lagged behind finalized attempts, reconciling from storage");
                    self.reconcile_logged().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("reward worker stopped");
    }

    async fn reconcile_logged(&self) {
        if let Err(e) = self.reconcile().await {
            tracing::error!(error = %e, "reward reconciliation failed; unpaid rewards remain owed until the next one");
        }
    }
}
