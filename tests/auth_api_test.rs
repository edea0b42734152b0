mod common;

use axum::http::{Method, StatusCode};
use classroom_backend::models::user::Role;
use common::{send, spawn_app, token_for};
use uuid::Uuid;

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app();
    let (status, body) = send(&app.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_attempts"], 0);
}

#[tokio::test]
async fn protected_routes_need_a_bearer_token() {
    let app = spawn_app();
    let uri = format!("/api/attempts/{}", Uuid::new_v4());

    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let (status, body) = send(&app.router, Method::GET, &uri, Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn tokens_signed_elsewhere_are_rejected() {
    let app = spawn_app();
    let forged = classroom_backend::utils::token::issue_access_token(
        Uuid::new_v4(),
        Role::Admin,
        "some-other-secret",
        1,
    )
    .unwrap()
    .0;
    let (status, _) = send(&app.router, Method::GET, "/api/shop/wallet", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn students_cannot_author_content() {
    let app = spawn_app();
    let student = token_for(Uuid::new_v4(), Role::Student);
    let body = serde_json::json!({ "title": "Rust 101" });
    let (status, _) = send(&app.router, Method::POST, "/api/courses", Some(&student), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
