//! Integration tests for the token middleware

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use proxy_api::auth::{auth_middleware, StorageToken};
use tower::ServiceExt; // for `oneshot`

async fn echo_token(axum::Extension(token): axum::Extension<StorageToken>) -> String {
    token.as_str().to_string()
}

fn create_test_app() -> Router {
    Router::new()
        .route("/protected", get(echo_token))
        .layer(middleware::from_fn(auth_middleware))
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_token_header_passes_through() {
    let request = Request::builder()
        .uri("/protected")
        .header("X-StorageApi-Token", "abc-123")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "abc-123");
}

#[tokio::test]
async fn test_header_name_is_case_insensitive() {
    let request = Request::builder()
        .uri("/protected")
        .header("x-storageapi-token", "abc-123")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_header_is_rejected() {
    let request = Request::builder()
        .uri("/protected")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.contains("Storage API token is required"));
}

#[tokio::test]
async fn test_blank_header_is_rejected() {
    let request = Request::builder()
        .uri("/protected")
        .header("X-StorageApi-Token", "   ")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_token_debug_is_redacted() {
    let token = StorageToken("super-secret".to_string());
    assert!(!format!("{token:?}").contains("super-secret"));
}
