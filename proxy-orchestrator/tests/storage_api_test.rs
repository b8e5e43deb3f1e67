//! Tests for the Storage API client against a local mock server

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use proxy_orchestrator::{OrchestratorError, ProvisioningClient, StorageApiClient};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GOOD_TOKEN: &str = "good-token";

#[derive(Clone, Default)]
struct MockState {
    created: Arc<Mutex<Vec<Value>>>,
    create_query: Arc<Mutex<Option<HashMap<String, String>>>>,
    /// `Content-Type` values of each request, in arrival order
    content_types: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockState {
    fn record(&self, headers: &HeaderMap) {
        let values = headers
            .get_all("content-type")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        self.content_types.lock().unwrap().push(values);
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-storageapi-token")
        .and_then(|h| h.to_str().ok())
        == Some(GOOD_TOKEN)
}

async fn verify(State(state): State<MockState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    state.record(&headers);
    if authorized(&headers) {
        (
            StatusCode::OK,
            Json(json!({ "id": 4242, "description": "svc" })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid access token" })),
        )
    }
}

async fn get_workspace(Path(name): Path<String>) -> (StatusCode, Json<Value>) {
    match name.as_str() {
        "MCP_4242_svc" => (
            StatusCode::OK,
            Json(json!({
                "id": 555,
                "name": "MCP_4242_svc",
                "connection": {
                    "host": "acme.snowflakecomputing.com",
                    "warehouse": "WH",
                    "database": "DB",
                    "schema": "WORKSPACE_555",
                    "user": "USER_555"
                }
            })),
        ),
        "MCP_broken_workspace" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Backend unavailable" })),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Workspace not found" })),
        ),
    }
}

async fn create_workspace(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(&headers);
    *state.create_query.lock().unwrap() = Some(query);
    state.created.lock().unwrap().push(body.clone());

    if body["name"] == "MCP_quota_exceeded" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Workspace limit reached" })),
        );
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "id": 556,
            "name": body["name"],
            "connection": {
                "host": "acme.snowflakecomputing.com",
                "warehouse": "WH",
                "database": "DB",
                "schema": "WORKSPACE_556",
                "user": "USER_556",
                "password": "initial-secret"
            }
        })),
    )
}

async fn reset_password(
    State(state): State<MockState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.record(&headers);
    match id.as_str() {
        "555" => (StatusCode::CREATED, Json(json!({ "password": "rotated" }))),
        "556" => (StatusCode::CREATED, Json(json!({}))),
        _ => (StatusCode::BAD_REQUEST, Json(Value::Null)),
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "id": 1 }))
}

async fn spawn_mock() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/v2/storage/tokens/verify", get(verify))
        .route("/v2/storage/workspaces", post(create_workspace))
        .route("/v2/storage/workspaces/{name}", get(get_workspace))
        .route("/v2/storage/workspaces/{name}/password", post(reset_password))
        .route("/slow/v2/storage/tokens/verify", get(slow))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

fn client(root: &str) -> StorageApiClient {
    StorageApiClient::new("unused.invalid", Duration::from_secs(5))
        .unwrap()
        .with_base_url(format!("{root}/v2"))
}

#[tokio::test]
async fn test_verify_token_returns_identity() {
    let (root, _) = spawn_mock().await;

    let details = client(&root).verify_token(GOOD_TOKEN).await.unwrap();

    assert_eq!(details.id, "4242");
    assert_eq!(details.description.as_deref(), Some("svc"));
}

#[tokio::test]
async fn test_verify_token_rejection_is_auth_error() {
    let (root, _) = spawn_mock().await;

    let err = client(&root).verify_token("bad").await.unwrap_err();

    match err {
        OrchestratorError::Auth(message) => assert_eq!(message, "Invalid access token"),
        other => panic!("Expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_find_workspace() {
    let (root, _) = spawn_mock().await;
    let client = client(&root);

    let found = client
        .find_workspace("MCP_4242_svc", GOOD_TOKEN)
        .await
        .unwrap()
        .expect("workspace should exist");
    assert_eq!(found.id, "555");
    assert_eq!(found.connection.schema, "WORKSPACE_555");

    let missing = client.find_workspace("MCP_nobody_x", GOOD_TOKEN).await.unwrap();
    assert!(missing.is_none());

    let err = client
        .find_workspace("MCP_broken_workspace", GOOD_TOKEN)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Provisioning(ref m) if m == "Backend unavailable"));
}

#[tokio::test]
async fn test_create_workspace_sends_expected_payload() {
    let (root, state) = spawn_mock().await;

    let created = client(&root)
        .create_workspace("MCP_4242_svc", GOOD_TOKEN)
        .await
        .unwrap();

    assert_eq!(created.id, "556");
    assert_eq!(created.credentials.password, "initial-secret");
    assert_eq!(created.credentials.user, "USER_556");

    let bodies = state.created.lock().unwrap().clone();
    assert_eq!(
        bodies,
        vec![json!({
            "name": "MCP_4242_svc",
            "backend": "snowflake",
            "readOnlyStorageAccess": true
        })]
    );
    let query = state.create_query.lock().unwrap().clone().unwrap();
    assert_eq!(query.get("async").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn test_create_workspace_failure_uses_api_message() {
    let (root, _) = spawn_mock().await;

    let err = client(&root)
        .create_workspace("MCP_quota_exceeded", GOOD_TOKEN)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Provisioning(ref m) if m == "Workspace limit reached"));
}

#[tokio::test]
async fn test_reset_password() {
    let (root, _) = spawn_mock().await;
    let client = client(&root);

    assert_eq!(client.reset_password("555", GOOD_TOKEN).await.unwrap(), "rotated");

    // Success without a password is still a failure
    let err = client.reset_password("556", GOOD_TOKEN).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Provisioning(_)));

    // No message in the body falls back to a generic one with the status
    let err = client.reset_password("999", GOOD_TOKEN).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Provisioning(ref m) if m.contains("400")));
}

#[tokio::test]
async fn test_every_request_sends_one_json_content_type() {
    let (root, state) = spawn_mock().await;
    let client = client(&root);

    client.verify_token(GOOD_TOKEN).await.unwrap();
    client.create_workspace("MCP_4242_svc", GOOD_TOKEN).await.unwrap();
    client.reset_password("555", GOOD_TOKEN).await.unwrap();

    let content_types = state.content_types.lock().unwrap().clone();
    assert_eq!(content_types.len(), 3);
    for values in content_types {
        assert_eq!(values, vec!["application/json".to_string()]);
    }
}

#[tokio::test]
async fn test_request_timeout_is_provisioning_error() {
    let (root, _) = spawn_mock().await;
    let client = StorageApiClient::new("unused.invalid", Duration::from_millis(100))
        .unwrap()
        .with_base_url(format!("{root}/slow/v2"));

    let err = client.verify_token(GOOD_TOKEN).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Provisioning(_)));
}
