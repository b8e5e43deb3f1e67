use crate::{auth::StorageToken, error::ApiResult, state::AppState};
use axum::{extract::State, routing::post, Extension, Json, Router};
use proxy_orchestrator::{ConnectionInfo, ResolvedWorkspace};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new().route("/workspace", post(resolve_workspace))
}

/// Workspace of the calling identity. The password is never returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceResponse {
    pub workspace_name: String,
    pub workspace_id: String,
    pub connection: ConnectionInfo,
}

impl From<ResolvedWorkspace> for WorkspaceResponse {
    fn from(workspace: ResolvedWorkspace) -> Self {
        Self {
            connection: workspace.credentials.connection_info(),
            workspace_name: workspace.name,
            workspace_id: workspace.id,
        }
    }
}

#[utoipa::path(
    post,
    path = "/workspace",
    tag = "workspaces",
    params(("X-StorageApi-Token" = String, Header, description = "Storage API token")),
    responses(
        (status = 200, description = "Workspace resolved", body = WorkspaceResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
        (status = 409, description = "Workspace is being provisioned by another request", body = crate::error::ErrorBody),
        (status = 503, description = "Storage API rejected provisioning", body = crate::error::ErrorBody)
    )
)]
pub async fn resolve_workspace(
    State(state): State<AppState>,
    Extension(token): Extension<StorageToken>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = state.orchestrator.resolve_workspace(token.as_str()).await?;

    Ok(Json(workspace.into()))
}
