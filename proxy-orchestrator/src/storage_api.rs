//! [`ProvisioningClient`] over the Storage API v2 HTTP interface

use crate::error::{OrchestratorError, Result};
use crate::provisioning::{
    ConnectionInfo, Credentials, ProvisionedWorkspace, ProvisioningClient, TokenDetails,
    WorkspaceInfo,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

const TOKEN_HEADER: &str = "x-storageapi-token";
const WORKSPACE_BACKEND: &str = "snowflake";

pub struct StorageApiClient {
    client: Client,
    base_url: String,
}

impl StorageApiClient {
    /// Client for `https://{host}/v2`. Every request is bounded by `timeout`.
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::Provisioning(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("https://{host}/v2"),
        })
    }

    /// Point the client at a different API root (e.g. `http://127.0.0.1:9000/v2`)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every request carries the token and a JSON content type. `headers`
    /// replaces rather than appends, so bodies set with `.json()` keep a
    /// single `Content-Type`.
    async fn send(&self, builder: RequestBuilder, token: &str) -> Result<Response> {
        builder
            .headers(request_headers(token)?)
            .send()
            .await
            .map_err(|e| OrchestratorError::Provisioning(format!("Storage API request failed: {e}")))
    }
}

#[async_trait]
impl ProvisioningClient for StorageApiClient {
    #[instrument(skip_all)]
    async fn verify_token(&self, token: &str) -> Result<TokenDetails> {
        let url = format!("{}/storage/tokens/verify", self.base_url);
        let response = self.send(self.client.get(&url), token).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = error_message(response, "Invalid token").await;
            return Err(OrchestratorError::Auth(message));
        }
        if status != StatusCode::OK {
            let message = error_message(response, "Failed to verify token").await;
            return Err(OrchestratorError::Provisioning(message));
        }

        let body: TokenResponse = parse(response).await?;
        Ok(TokenDetails {
            id: id_string(&body.id)?,
            description: body.description,
        })
    }

    #[instrument(skip(self, token))]
    async fn find_workspace(&self, name: &str, token: &str) -> Result<Option<WorkspaceInfo>> {
        let url = format!("{}/storage/workspaces/{}", self.base_url, name);
        let response = self.send(self.client.get(&url), token).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Workspace does not exist");
            return Ok(None);
        }
        if status != StatusCode::OK {
            let message = error_message(response, "Failed to get workspace").await;
            return Err(OrchestratorError::Provisioning(message));
        }

        let body: WorkspaceResponse = parse(response).await?;
        let connection = body.connection.unwrap_or_default();

        Ok(Some(WorkspaceInfo {
            id: id_string(&body.id)?,
            name: body.name.unwrap_or_else(|| name.to_string()),
            connection: connection.connection_info(),
        }))
    }

    #[instrument(skip(self, token))]
    async fn create_workspace(&self, name: &str, token: &str) -> Result<ProvisionedWorkspace> {
        let url = format!("{}/storage/workspaces?async=false", self.base_url);
        let payload = json!({
            "name": name,
            "backend": WORKSPACE_BACKEND,
            "readOnlyStorageAccess": true,
        });

        let response = self.send(self.client.post(&url).json(&payload), token).await?;

        if !response.status().is_success() {
            let message = error_message(response, "Failed to create workspace").await;
            return Err(OrchestratorError::Provisioning(message));
        }

        let body: WorkspaceResponse = parse(response).await?;
        let connection = body.connection.unwrap_or_default();

        Ok(ProvisionedWorkspace {
            id: id_string(&body.id)?,
            credentials: connection.credentials(),
        })
    }

    #[instrument(skip(self, token))]
    async fn reset_password(&self, workspace_id: &str, token: &str) -> Result<String> {
        let url = format!("{}/storage/workspaces/{}/password", self.base_url, workspace_id);
        let response = self.send(self.client.post(&url), token).await?;

        if !response.status().is_success() {
            let message = error_message(response, "Failed to reset password").await;
            return Err(OrchestratorError::Provisioning(message));
        }

        let body: PasswordResponse = parse(response).await?;
        body.password
            .filter(|password| !password.is_empty())
            .ok_or_else(|| {
                OrchestratorError::Provisioning("Password reset returned no password".to_string())
            })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    id: Value,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct WorkspaceResponse {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    connection: Option<ConnectionResponse>,
}

#[derive(Deserialize, Default)]
struct ConnectionResponse {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    warehouse: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl ConnectionResponse {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.host.clone().unwrap_or_default(),
            warehouse: self.warehouse.clone().unwrap_or_default(),
            database: self.database.clone().unwrap_or_default(),
            schema: self.schema.clone().unwrap_or_default(),
            user: self.user.clone().unwrap_or_default(),
        }
    }

    fn credentials(&self) -> Credentials {
        self.connection_info()
            .with_password(self.password.clone().unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct PasswordResponse {
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

fn request_headers(token: &str) -> Result<HeaderMap> {
    let token = HeaderValue::from_str(token)
        .map_err(|_| OrchestratorError::Auth("Token contains invalid characters".to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(TOKEN_HEADER, token);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| OrchestratorError::Provisioning(format!("Malformed Storage API response: {e}")))
}

async fn error_message(response: Response, fallback: &str) -> String {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.message);

    match message {
        Some(message) => message,
        None => format!("{fallback} (HTTP {})", status.as_u16()),
    }
}

/// Ids come back as numbers or strings depending on the endpoint
fn id_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(OrchestratorError::Provisioning(format!(
            "Unexpected id in Storage API response: {other}"
        ))),
    }
}
