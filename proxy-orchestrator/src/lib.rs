//! Workspace provisioning and credential caching
//!
//! Resolves a Storage API token to a per-identity workspace, caching its
//! credentials so that repeat requests skip provisioning entirely. It is
//! consumed by the proxy-api HTTP service but has no HTTP dependencies of its
//! own beyond the Storage API client.

pub mod db;
pub mod error;
pub mod locks;
pub mod naming;
pub mod provisioning;
pub mod recovery;
pub mod storage_api;
pub mod store;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{OrchestratorError, Result};
pub use locks::{LockAcquire, LockRegistry, LockRelease, WorkspaceLock};
pub use naming::workspace_name;
pub use provisioning::{
    ConnectionInfo, Credentials, ProvisionedWorkspace, ProvisioningClient, TokenDetails,
    WorkspaceInfo,
};
pub use recovery::{QueryEngine, QueryFailure, QueryOutcome, QueryResult, UnconfiguredQueryEngine};
pub use storage_api::StorageApiClient;
pub use store::{CredentialStore, SqliteCredentialStore, WorkspaceRecord};
pub use workspace::{ResolvedWorkspace, WorkspaceOrchestrator};
