use crate::{auth::StorageToken, error::ApiResult, state::AppState};
use axum::{extract::State, routing::post, Extension, Json, Router};
use proxy_orchestrator::QueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new().route("/query", post(run_query))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryResponse {
    pub workspace_name: String,
    pub workspace_id: String,
    pub result: QueryResult,
}

/// Execute a SQL query in the caller's workspace
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    request_body = QueryRequest,
    params(("X-StorageApi-Token" = String, Header, description = "Storage API token")),
    responses(
        (status = 200, description = "Query executed", body = QueryResponse),
        (status = 400, description = "Empty query or syntax error", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
        (status = 403, description = "Insufficient privileges", body = crate::error::ErrorBody),
        (status = 409, description = "Workspace is being provisioned by another request", body = crate::error::ErrorBody),
        (status = 502, description = "Query engine failure", body = crate::error::ErrorBody),
        (status = 503, description = "Storage API rejected provisioning", body = crate::error::ErrorBody),
        (status = 504, description = "Query timed out", body = crate::error::ErrorBody)
    )
)]
pub async fn run_query(
    State(state): State<AppState>,
    Extension(token): Extension<StorageToken>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    let outcome = state
        .orchestrator
        .execute_query(token.as_str(), &request.query, state.engine.as_ref())
        .await?;

    Ok(Json(QueryResponse {
        workspace_name: outcome.workspace.name,
        workspace_id: outcome.workspace.id,
        result: outcome.result,
    }))
}
