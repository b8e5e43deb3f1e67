//! Common test utilities and helpers for proxy-api tests

#![allow(dead_code)]

use axum::Router;
use proxy_api::AppState;
use proxy_orchestrator::test_utils::{create_test_db, FakeProvisioningClient, FakeQueryEngine};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN: &str = "tok-u1";

/// Everything a test needs to drive the app and inspect its collaborators
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub provisioning: Arc<FakeProvisioningClient>,
    pub engine: Arc<FakeQueryEngine>,
}

/// Fake Storage API that knows a single identity `u1`/`svc` behind [`TOKEN`]
pub fn default_provisioning() -> FakeProvisioningClient {
    FakeProvisioningClient::new().with_identity(TOKEN, "u1", Some("svc"))
}

pub async fn create_test_context(provisioning: FakeProvisioningClient) -> TestContext {
    create_test_context_with_lock_timeout(provisioning, Duration::from_secs(5)).await
}

pub async fn create_test_context_with_lock_timeout(
    provisioning: FakeProvisioningClient,
    lock_timeout: Duration,
) -> TestContext {
    let pool = create_test_db().await;
    let provisioning = Arc::new(provisioning);
    let engine = Arc::new(FakeQueryEngine::new(provisioning.clone()));

    let state = AppState::new(
        pool,
        provisioning.clone(),
        engine.clone(),
        lock_timeout,
        Duration::from_secs(5),
    );

    TestContext {
        app: proxy_api::create_app(state.clone()),
        state,
        provisioning,
        engine,
    }
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

pub fn post_json(
    uri: &str,
    body: &serde_json::Value,
    token: Option<&str>,
) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");

    if let Some(token) = token {
        builder = builder.header("X-StorageApi-Token", token);
    }

    builder
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}
