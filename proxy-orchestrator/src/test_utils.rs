//! In-process fakes for exercising the orchestrator without a Storage API or
//! a warehouse.

use crate::error::{OrchestratorError, Result};
use crate::provisioning::{
    ConnectionInfo, Credentials, ProvisionedWorkspace, ProvisioningClient, TokenDetails,
    WorkspaceInfo,
};
use crate::recovery::{QueryEngine, QueryFailure, QueryResult};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Helper to create an in-memory test database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn sample_credentials(password: &str) -> Credentials {
    Credentials {
        host: "acme.snowflakecomputing.com".to_string(),
        warehouse: "KEBOOLA_PROD".to_string(),
        database: "KEBOOLA_1".to_string(),
        schema: "WORKSPACE_1".to_string(),
        user: "KEBOOLA_WORKSPACE_1".to_string(),
        password: password.to_string(),
    }
}

#[derive(Debug, Clone)]
struct FakeWorkspace {
    id: String,
    name: String,
    password: String,
}

impl FakeWorkspace {
    fn connection(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: "fake.snowflakecomputing.com".to_string(),
            warehouse: "FAKE_WH".to_string(),
            database: "FAKE_DB".to_string(),
            // The schema identifies the workspace for FakeQueryEngine
            schema: self.name.clone(),
            user: format!("{}_USER", self.name),
        }
    }
}

/// Stand-in for the Storage API that keeps external workspace state in
/// memory and counts every call.
#[derive(Default)]
pub struct FakeProvisioningClient {
    identities: Mutex<HashMap<String, TokenDetails>>,
    workspaces: Mutex<HashMap<String, FakeWorkspace>>,
    next_id: AtomicU64,
    next_password: AtomicU64,
    latency: Duration,
    fail_create: AtomicBool,
    fail_reset: AtomicBool,
    verify_calls: AtomicUsize,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    reset_calls: AtomicUsize,
}

impl FakeProvisioningClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Default::default()
        }
    }

    /// Accept `token` as belonging to `id`/`description`
    pub fn with_identity(self, token: &str, id: &str, description: Option<&str>) -> Self {
        self.identities.lock().unwrap().insert(
            token.to_string(),
            TokenDetails {
                id: id.to_string(),
                description: description.map(str::to_string),
            },
        );
        self
    }

    /// Pretend a workspace already exists externally
    pub fn with_existing_workspace(self, name: &str, id: &str) -> Self {
        self.workspaces.lock().unwrap().insert(
            name.to_string(),
            FakeWorkspace {
                id: id.to_string(),
                name: name.to_string(),
                password: "original-password".to_string(),
            },
        );
        self
    }

    /// Delay applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Change a workspace password behind the cache's back
    pub fn rotate_password_out_of_band(&self, name: &str) {
        let password = self.fresh_password();
        if let Some(workspace) = self.workspaces.lock().unwrap().get_mut(name) {
            workspace.password = password;
        }
    }

    /// Live password of workspace `name`
    pub fn current_password(&self, name: &str) -> Option<String> {
        self.workspaces
            .lock()
            .unwrap()
            .get(name)
            .map(|workspace| workspace.password.clone())
    }

    pub fn workspace_id(&self, name: &str) -> Option<String> {
        self.workspaces
            .lock()
            .unwrap()
            .get(name)
            .map(|workspace| workspace.id.clone())
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    /// Calls that change external state
    pub fn mutating_calls(&self) -> usize {
        self.create_calls() + self.reset_calls()
    }

    fn fresh_password(&self) -> String {
        format!("pw-{}", self.next_password.fetch_add(1, Ordering::SeqCst))
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ProvisioningClient for FakeProvisioningClient {
    async fn verify_token(&self, token: &str) -> Result<TokenDetails> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        self.identities
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| OrchestratorError::Auth("Invalid access token".to_string()))
    }

    async fn find_workspace(&self, name: &str, _token: &str) -> Result<Option<WorkspaceInfo>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .get(name)
            .map(|workspace| WorkspaceInfo {
                id: workspace.id.clone(),
                name: workspace.name.clone(),
                connection: workspace.connection(),
            }))
    }

    async fn create_workspace(&self, name: &str, _token: &str) -> Result<ProvisionedWorkspace> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Provisioning(
                "Workspace quota exceeded".to_string(),
            ));
        }

        let workspace = FakeWorkspace {
            id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
            name: name.to_string(),
            password: self.fresh_password(),
        };
        let provisioned = ProvisionedWorkspace {
            id: workspace.id.clone(),
            credentials: workspace.connection().with_password(workspace.password.clone()),
        };

        self.workspaces
            .lock()
            .unwrap()
            .insert(name.to_string(), workspace);

        Ok(provisioned)
    }

    async fn reset_password(&self, workspace_id: &str, _token: &str) -> Result<String> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Provisioning(
                "Password reset rejected".to_string(),
            ));
        }

        let password = self.fresh_password();
        let mut workspaces = self.workspaces.lock().unwrap();
        let workspace = workspaces
            .values_mut()
            .find(|workspace| workspace.id == workspace_id)
            .ok_or_else(|| {
                OrchestratorError::Provisioning(format!("Workspace {workspace_id} not found"))
            })?;
        workspace.password = password.clone();

        Ok(password)
    }
}

/// Query engine that authenticates against [`FakeProvisioningClient`]'s live
/// passwords and records every password it was handed.
pub struct FakeQueryEngine {
    provisioning: Arc<FakeProvisioningClient>,
    scripted: Mutex<VecDeque<QueryFailure>>,
    seen_passwords: Mutex<Vec<String>>,
}

impl FakeQueryEngine {
    pub fn new(provisioning: Arc<FakeProvisioningClient>) -> Self {
        Self {
            provisioning,
            scripted: Mutex::new(VecDeque::new()),
            seen_passwords: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next execution with `failure`, regardless of credentials
    pub fn fail_next(&self, failure: QueryFailure) {
        self.scripted.lock().unwrap().push_back(failure);
    }

    pub fn seen_passwords(&self) -> Vec<String> {
        self.seen_passwords.lock().unwrap().clone()
    }

    pub fn executions(&self) -> usize {
        self.seen_passwords.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryEngine for FakeQueryEngine {
    async fn execute(
        &self,
        credentials: &Credentials,
        query: &str,
    ) -> std::result::Result<QueryResult, QueryFailure> {
        self.seen_passwords
            .lock()
            .unwrap()
            .push(credentials.password.clone());

        if let Some(failure) = self.scripted.lock().unwrap().pop_front() {
            return Err(failure);
        }

        if credentials.password.is_empty() {
            return Err(QueryFailure::Authentication("empty password".to_string()));
        }

        match self.provisioning.current_password(&credentials.schema) {
            Some(live) if live == credentials.password => Ok(QueryResult {
                columns: vec!["QUERY".to_string()],
                rows: vec![vec![serde_json::Value::String(query.to_string())]],
            }),
            _ => Err(QueryFailure::Authentication(
                "Incorrect username or password was specified".to_string(),
            )),
        }
    }
}
