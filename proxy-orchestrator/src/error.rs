use crate::recovery::QueryFailure;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Timed out waiting for workspace lock: {name}")]
    LockTimeout { name: String },

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Query failed: {0}")]
    Query(QueryFailure),
}

impl OrchestratorError {
    /// Errors raised by the credential cache itself rather than by a
    /// collaborator. These are fatal to the request.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Database(_)
                | OrchestratorError::Migration(_)
                | OrchestratorError::Serialization(_)
                | OrchestratorError::Io(_)
        )
    }

    /// Contention on a workspace lock; the caller may retry shortly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::LockTimeout { .. })
    }
}

impl From<QueryFailure> for OrchestratorError {
    fn from(failure: QueryFailure) -> Self {
        OrchestratorError::Query(failure)
    }
}
