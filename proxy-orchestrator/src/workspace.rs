use crate::error::{OrchestratorError, Result};
use crate::locks::{LockAcquire, LockRegistry, WorkspaceLock};
use crate::naming::workspace_name_for;
use crate::provisioning::{Credentials, ProvisioningClient};
use crate::store::{CredentialStore, WorkspaceRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A workspace with credentials ready to hand to the query engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkspace {
    pub name: String,
    pub id: String,
    pub credentials: Credentials,
}

impl From<WorkspaceRecord> for ResolvedWorkspace {
    fn from(record: WorkspaceRecord) -> Self {
        Self {
            name: record.name,
            id: record.id,
            credentials: record.credentials,
        }
    }
}

/// Resolves caller tokens to provisioned workspaces.
///
/// Lookups go to the credential cache first. On a miss the workspace name is
/// locked, the cache is checked again, and only then is the external system
/// asked to create the workspace or reset its password. Concurrent callers for
/// one identity therefore cause at most one provisioning call.
#[derive(Clone)]
pub struct WorkspaceOrchestrator {
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) provisioning: Arc<dyn ProvisioningClient>,
    locks: LockRegistry,
    lock_timeout: Duration,
    call_timeout: Duration,
}

impl WorkspaceOrchestrator {
    pub fn new(store: Arc<dyn CredentialStore>, provisioning: Arc<dyn ProvisioningClient>) -> Self {
        Self {
            store,
            provisioning,
            locks: LockRegistry::new(DEFAULT_LOCK_TIMEOUT),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// How long to wait for a contended workspace lock. Also used as the idle
    /// window after which unused lock entries are reclaimed.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self.locks = LockRegistry::new(timeout);
        self
    }

    /// Deadline for each individual provisioning call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Resolve the caller's workspace, provisioning it on first use
    #[instrument(skip_all, fields(workspace = tracing::field::Empty))]
    pub async fn resolve_workspace(&self, token: &str) -> Result<ResolvedWorkspace> {
        let identity = self.call("verify_token", self.provisioning.verify_token(token)).await?;
        let name = workspace_name_for(&identity)?;
        tracing::Span::current().record("workspace", name.as_str());

        if let Some(record) = self.store.get(&name).await? {
            debug!("Credential cache hit");
            return Ok(record.into());
        }

        let mut lock = self.lock(&name).await?;
        let result = self.provision_locked(&name, token).await;
        lock.release();

        result
    }

    /// Steps that must run with the workspace lock held
    async fn provision_locked(&self, name: &str, token: &str) -> Result<ResolvedWorkspace> {
        // Another caller may have provisioned while we were waiting
        if let Some(record) = self.store.get(name).await? {
            debug!("Credential cache filled while waiting for lock");
            return Ok(record.into());
        }

        let existing = self
            .call("find_workspace", self.provisioning.find_workspace(name, token))
            .await?;

        let (id, credentials) = match existing {
            Some(workspace) => {
                info!(
                    workspace_id = %workspace.id,
                    "Workspace exists without cached credentials, resetting password"
                );
                let password = self
                    .call(
                        "reset_password",
                        self.provisioning.reset_password(&workspace.id, token),
                    )
                    .await?;
                let credentials = workspace.connection.with_password(password);
                (workspace.id, credentials)
            }
            None => {
                info!("Creating workspace");
                let created = self
                    .call("create_workspace", self.provisioning.create_workspace(name, token))
                    .await?;
                (created.id, created.credentials)
            }
        };

        let record = self.store.put(name, &id, &credentials).await?;
        info!(workspace_id = %record.id, "Stored workspace credentials");

        Ok(record.into())
    }

    pub(crate) async fn lock(&self, name: &str) -> Result<WorkspaceLock> {
        match self.locks.acquire(name, self.lock_timeout).await {
            LockAcquire::Granted(lock) => Ok(lock),
            LockAcquire::TimedOut => {
                warn!(workspace = %name, "Timed out waiting for workspace lock");
                Err(OrchestratorError::LockTimeout {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Bound a provisioning call by the configured deadline
    pub(crate) async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.call_timeout, "Provisioning call timed out");
                Err(OrchestratorError::Provisioning(format!(
                    "{} timed out after {:?}",
                    operation, self.call_timeout
                )))
            }
        }
    }
}
