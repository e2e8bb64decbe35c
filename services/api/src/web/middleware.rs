//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The bearer token a request was authenticated with.
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that validates the bearer token and extracts the user id.
///
/// If valid, inserts `CurrentUser` and `BearerToken` into request extensions.
/// If invalid, expired or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
        .to_string();

    let user_id = state
        .users
        .validate_auth_session(&token)
        .await
        .map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

    req.extensions_mut().insert(CurrentUser(user_id));
    req.extensions_mut().insert(BearerToken(token));

    Ok(next.run(req).await)
}
