//! Query execution seam and stale-credential recovery.
//!
//! Cached credentials can go stale when the external workspace has its
//! password rotated out of band. That is only noticed when a query fails to
//! authenticate; the orchestrator then resets the password once, stores the
//! refreshed credentials, and retries the query exactly once.

use crate::error::{OrchestratorError, Result};
use crate::provisioning::Credentials;
use crate::workspace::{ResolvedWorkspace, WorkspaceOrchestrator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

/// Tabular query result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Classified query failure reported by the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// Bad or empty credentials. The only kind that triggers recovery.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("query timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl QueryFailure {
    pub fn is_authentication(&self) -> bool {
        matches!(self, QueryFailure::Authentication(_))
    }
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(
        &self,
        credentials: &Credentials,
        query: &str,
    ) -> std::result::Result<QueryResult, QueryFailure>;
}

/// Engine used when no warehouse driver is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredQueryEngine;

#[async_trait]
impl QueryEngine for UnconfiguredQueryEngine {
    async fn execute(
        &self,
        _credentials: &Credentials,
        _query: &str,
    ) -> std::result::Result<QueryResult, QueryFailure> {
        Err(QueryFailure::Other("no query engine configured".to_string()))
    }
}

/// A successful query together with the workspace it ran in
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub workspace: ResolvedWorkspace,
    pub result: QueryResult,
}

impl WorkspaceOrchestrator {
    /// Resolve the caller's workspace and run `query` in it.
    ///
    /// An authentication failure triggers one password reset and one retry;
    /// the retry's outcome is final.
    #[instrument(skip_all)]
    pub async fn execute_query(
        &self,
        token: &str,
        query: &str,
        engine: &dyn QueryEngine,
    ) -> Result<QueryOutcome> {
        if query.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let workspace = self.resolve_workspace(token).await?;

        match engine.execute(&workspace.credentials, query).await {
            Ok(result) => Ok(QueryOutcome { workspace, result }),
            Err(failure) if failure.is_authentication() => {
                warn!(workspace = %workspace.name, %failure, "Cached credentials rejected, recovering");

                let refreshed = self.recover_credentials(&workspace, token).await?;
                let result = engine.execute(&refreshed.credentials, query).await?;

                Ok(QueryOutcome {
                    workspace: refreshed,
                    result,
                })
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Replace the stale password of `stale` and write it back to the cache.
    ///
    /// Runs under the same workspace lock as provisioning. If the cache
    /// already holds something newer than `stale` (another caller recovered
    /// first, or the workspace was re-provisioned) that is returned instead of
    /// resetting again.
    #[instrument(skip_all, fields(workspace = %stale.name))]
    pub async fn recover_credentials(
        &self,
        stale: &ResolvedWorkspace,
        token: &str,
    ) -> Result<ResolvedWorkspace> {
        let mut lock = self.lock(&stale.name).await?;
        let result = self.refresh_locked(stale, token).await;
        lock.release();

        result
    }

    async fn refresh_locked(&self, stale: &ResolvedWorkspace, token: &str) -> Result<ResolvedWorkspace> {
        let current = self.store.get(&stale.name).await?;

        if let Some(record) = &current {
            let superseded = record.id != stale.id;
            let already_refreshed = record.credentials.password != stale.credentials.password
                && !record.credentials.password.is_empty();

            if superseded || already_refreshed {
                debug!(workspace_id = %record.id, "Cache already holds newer credentials");
                return Ok(record.clone().into());
            }
        }

        let base = current
            .map(|record| record.credentials)
            .unwrap_or_else(|| stale.credentials.clone());

        let password = self
            .call(
                "reset_password",
                self.provisioning.reset_password(&stale.id, token),
            )
            .await?;

        let record = self
            .store
            .put(&stale.name, &stale.id, &base.with_password(password))
            .await?;
        info!(workspace_id = %record.id, "Stored refreshed credentials");

        Ok(record.into())
    }
}
