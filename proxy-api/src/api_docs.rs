use crate::error::ErrorBody;
use crate::routes::query::{QueryRequest, QueryResponse};
use crate::routes::workspaces::WorkspaceResponse;
use proxy_orchestrator::{ConnectionInfo, QueryResult};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::workspaces::resolve_workspace,
        crate::routes::query::run_query,
    ),
    components(
        schemas(
            WorkspaceResponse,
            ConnectionInfo,
            QueryRequest,
            QueryResponse,
            QueryResult,
            ErrorBody
        )
    ),
    tags(
        (name = "proxy-api", description = "Storage API query proxy")
    )
)]
pub struct ApiDoc;
