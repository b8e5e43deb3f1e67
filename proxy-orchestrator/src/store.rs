use crate::error::Result;
use crate::provisioning::Credentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

/// Cached credentials for one workspace, keyed by workspace name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRecord {
    pub name: String,
    pub id: String,
    pub credentials: Credentials,
    pub updated_at: DateTime<Utc>,
}

/// Durable name -> record cache.
///
/// Implementations must support concurrent reads and upserts. Serializing
/// writers for one name is the lock registry's job, not the store's.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<WorkspaceRecord>>;

    /// Upsert by name, replacing any previous record.
    async fn put(&self, name: &str, id: &str, credentials: &Credentials)
        -> Result<WorkspaceRecord>;
}

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<Option<WorkspaceRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT workspace_name, workspace_id, credentials, updated_at
             FROM workspace_credentials WHERE workspace_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkspaceRecord::try_from).transpose()
    }

    #[instrument(skip(self, credentials))]
    async fn put(
        &self,
        name: &str,
        id: &str,
        credentials: &Credentials,
    ) -> Result<WorkspaceRecord> {
        let blob = serde_json::to_string(credentials)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO workspace_credentials (workspace_name, workspace_id, credentials, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(workspace_name) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                credentials = excluded.credentials,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(id)
        .bind(&blob)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(WorkspaceRecord {
            name: name.to_string(),
            id: id.to_string(),
            credentials: credentials.clone(),
            updated_at: DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now),
        })
    }
}

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct CredentialRow {
    workspace_name: String,
    workspace_id: String,
    credentials: String,
    updated_at: i64,
}

impl TryFrom<CredentialRow> for WorkspaceRecord {
    type Error = crate::error::OrchestratorError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        Ok(Self {
            name: row.workspace_name,
            id: row.workspace_id,
            credentials: serde_json::from_str(&row.credentials)?,
            updated_at: DateTime::from_timestamp(row.updated_at, 0).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_db, sample_credentials};

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = SqliteCredentialStore::new(create_test_db().await);

        let record = store.get("MCP_nobody_workspace").await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = SqliteCredentialStore::new(create_test_db().await);
        let credentials = sample_credentials("pw-1");

        store.put("MCP_u1_svc", "1001", &credentials).await.unwrap();

        let record = store.get("MCP_u1_svc").await.unwrap().expect("record");
        assert_eq!(record.name, "MCP_u1_svc");
        assert_eq!(record.id, "1001");
        assert_eq!(record.credentials, credentials);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_record() {
        let store = SqliteCredentialStore::new(create_test_db().await);

        store
            .put("MCP_u1_svc", "1001", &sample_credentials("old"))
            .await
            .unwrap();
        store
            .put("MCP_u1_svc", "1002", &sample_credentials("new"))
            .await
            .unwrap();

        let record = store.get("MCP_u1_svc").await.unwrap().expect("record");
        assert_eq!(record.id, "1002");
        assert_eq!(record.credentials.password, "new");

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspace_credentials")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_a_storage_error() {
        let store = SqliteCredentialStore::new(create_test_db().await);

        sqlx::query(
            "INSERT INTO workspace_credentials (workspace_name, workspace_id, credentials, updated_at)
             VALUES ('MCP_bad_row', '1', 'not json', 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.get("MCP_bad_row").await.unwrap_err();
        assert!(err.is_storage());
    }
}
