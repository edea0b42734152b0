pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::repository::{AttemptRepository, PgAttemptRepository};
use crate::services::{
    attempt_service::AttemptService, auth_service::AuthService, course_service::CourseService,
    message_service::MessageService, reward_service::RewardService, shop_service::ShopService,
    test_service::TestService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth_service: AuthService,
    pub course_service: CourseService,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub message_service: MessageService,
    pub shop_service: ShopService,
    pub reward_service: RewardService,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let repository: Arc<dyn AttemptRepository> = Arc::new(PgAttemptRepository::new(pool.clone()));
        Self::with_attempt_repository(pool, config, repository)
    }

    /// Same wiring with a caller-supplied store behind the attempt flow.
    pub fn with_attempt_repository(
        pool: PgPool,
        config: &Config,
        repository: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            auth_service: AuthService::new(pool.clone(), &config.jwt_secret, config.jwt_ttl_hours),
            course_service: CourseService::new(pool.clone()),
            test_service: TestService::new(pool.clone()),
            attempt_service: AttemptService::new(repository),
            message_service: MessageService::new(pool.clone(), config.max_attachment_bytes),
            shop_service: ShopService::new(pool.clone()),
            reward_service: RewardService::new(pool.clone(), config.coins_per_passed_test),
            pool,
        }
    }
}
