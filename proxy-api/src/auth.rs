use crate::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};

pub const TOKEN_HEADER: &str = "x-storageapi-token";

/// Storage API token presented by the caller
#[derive(Clone)]
pub struct StorageToken(pub String);

impl StorageToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for StorageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageToken(<redacted>)")
    }
}

/// Auth middleware - requires an `X-StorageApi-Token` header.
///
/// The token itself is verified by the Storage API when the workspace is
/// resolved; this only rejects requests that carry no token at all.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Storage API token is required".to_string()))?;

    req.extensions_mut().insert(StorageToken(token));

    Ok(next.run(req).await)
}
