//! Admin session middleware.
//!
//! Guards the dashboard routes:
//! 1. Extract the session token from the Authorization header
//! 2. Check it against the live sessions
//! 3. Reject missing or expired tokens with HTTP 401

use crate::{app::AppState, error::AppError};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Admin authentication middleware function.
///
/// # Headers
///
/// Either form is accepted:
/// ```text
/// Authorization: 3f9a...e1
/// Authorization: Bearer 3f9a...e1
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if the token names a live session (calls next handler)
/// - `Err(AppError::Unauthorized)` otherwise (returns 401)
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(session_token)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    if !state.sessions.validate(token).await {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn session_token(header_value: &str) -> &str {
    let value = header_value.trim();
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}
