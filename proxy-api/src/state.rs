use proxy_orchestrator::{
    ProvisioningClient, QueryEngine, SqliteCredentialStore, WorkspaceOrchestrator,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkspaceOrchestrator,
    pub engine: Arc<dyn QueryEngine>,
    pub pool: SqlitePool,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        provisioning: Arc<dyn ProvisioningClient>,
        engine: Arc<dyn QueryEngine>,
        lock_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        let store = Arc::new(SqliteCredentialStore::new(pool.clone()));
        let orchestrator = WorkspaceOrchestrator::new(store, provisioning)
            .with_lock_timeout(lock_timeout)
            .with_call_timeout(call_timeout);

        Self {
            orchestrator,
            engine,
            pool,
        }
    }
}
