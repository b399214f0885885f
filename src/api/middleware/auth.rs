//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, validates against the
//! session store, and injects `AuthContext` into request extensions
//! for downstream handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};

/// Require a valid bearer token from a known session.
///
/// Accesses `ApiContext` from request extensions (injected by the
/// Extension layer). On success injects `AuthContext`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let (user_id, role) = {
        let sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        sessions.validate(&token).ok_or(ApiError::Unauthorized)?
    }; // MutexGuard dropped here, before any .await

    req.extensions_mut().insert(AuthContext { user_id, role });
    Ok(next.run(req).await)
}
