//! Contract for the external workspace provisioning system.
//!
//! The orchestrator only ever talks to the Storage API through
//! [`ProvisioningClient`]. `find_workspace` is safe to repeat;
//! `create_workspace` and `reset_password` are not and are only called while
//! the workspace lock is held.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Verified caller identity behind a Storage API token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    pub id: String,
    pub description: Option<String>,
}

/// Everything needed to open a warehouse connection
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub warehouse: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Same connection, different password
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..self.clone()
        }
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.host.clone(),
            warehouse: self.warehouse.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            user: self.user.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Non-secret part of [`Credentials`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub warehouse: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub user: String,
}

impl ConnectionInfo {
    pub fn with_password(&self, password: impl Into<String>) -> Credentials {
        Credentials {
            host: self.host.clone(),
            warehouse: self.warehouse.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            user: self.user.clone(),
            password: password.into(),
        }
    }
}

/// A workspace as reported by the external system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    pub connection: ConnectionInfo,
}

/// Result of a successful `create_workspace`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedWorkspace {
    pub id: String,
    pub credentials: Credentials,
}

#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Resolve a token to the identity it belongs to.
    ///
    /// Fails with `OrchestratorError::Auth` when the token is rejected.
    async fn verify_token(&self, token: &str) -> Result<TokenDetails>;

    /// Look up an existing workspace by name. `Ok(None)` when it does not exist.
    async fn find_workspace(&self, name: &str, token: &str) -> Result<Option<WorkspaceInfo>>;

    /// Create a workspace named `name`. Not idempotent.
    async fn create_workspace(&self, name: &str, token: &str) -> Result<ProvisionedWorkspace>;

    /// Rotate the password of an existing workspace and return the new one.
    /// Not idempotent.
    async fn reset_password(&self, workspace_id: &str, token: &str) -> Result<String>;
}
