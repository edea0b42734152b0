pub mod attempts;
pub mod auth;
pub mod chat;
pub mod courses;
pub mod health;
pub mod shop;
pub mod tests;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{auth::require_auth, cors::api_cors, rate_limit};
use crate::AppState;

/// Assembles every route with its middleware. `body_limit` bounds JSON
/// bodies, which carry base64 attachments.
pub fn build_router(state: AppState, api_rps: u32, body_limit: usize) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let auth_api = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_api = Router::new()
        .route(
            "/api/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route("/api/courses/:id", get(courses::get_course))
        .route("/api/courses/:id/lessons", post(courses::create_lesson))
        .route("/api/courses/:id/progress", get(courses::my_progress))
        .route("/api/lessons/:id/test", post(tests::create_test))
        .route("/api/lessons/:id/attempts", post(attempts::start_attempt))
        .route("/api/attempts/:id", get(attempts::get_attempt))
        .route("/api/attempts/:id/answer", patch(attempts::save_answer))
        .route("/api/attempts/:id/navigate", post(attempts::navigate))
        .route("/api/attempts/:id/finish", post(attempts::finish))
        .route("/api/tests/:id", get(tests::get_test))
        .route("/api/tests/:id/attempts", get(tests::list_attempts))
        .route(
            "/api/courses/:id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/api/attachments/:id", get(chat::download_attachment))
        .route(
            "/api/shop/items",
            get(shop::list_items).post(shop::create_item),
        )
        .route("/api/shop/wallet", get(shop::wallet))
        .route("/api/shop/items/:id/purchase", post(shop::purchase))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = auth_api.merge(protected_api).layer(from_fn_with_state(
        rate_limit::RateLimiter::new(api_rps),
        rate_limit::rps_middleware,
    ));

    base_routes
        .merge(api)
        .with_state(state)
        .layer(api_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}
