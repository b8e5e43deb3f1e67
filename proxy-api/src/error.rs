use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use proxy_orchestrator::{OrchestratorError, QueryFailure};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    Forbidden(String),
    /// Workspace lock contention; the client should retry
    Conflict(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    Internal(String),
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::Unauthorized(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::GatewayTimeout(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = ?self, "Request failed");
        }

        (
            status,
            Json(ErrorBody {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Auth(msg) => ApiError::Unauthorized(msg),
            OrchestratorError::LockTimeout { name } => ApiError::Conflict(format!(
                "Workspace {} is being provisioned, try again shortly",
                name
            )),
            OrchestratorError::Provisioning(msg) => ApiError::ServiceUnavailable(msg),
            OrchestratorError::InvalidInput(msg) => ApiError::BadRequest(msg),
            OrchestratorError::Query(failure) => failure.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<QueryFailure> for ApiError {
    fn from(failure: QueryFailure) -> Self {
        let message = failure.to_string();
        match failure {
            QueryFailure::Syntax(_) => ApiError::BadRequest(message),
            QueryFailure::Permission(_) => ApiError::Forbidden(message),
            QueryFailure::Timeout(_) => ApiError::GatewayTimeout(message),
            QueryFailure::Authentication(_) | QueryFailure::Other(_) => {
                ApiError::BadGateway(message)
            }
        }
    }
}
