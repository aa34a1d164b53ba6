//! Admin dashboard HTTP handlers.
//!
//! - POST /api/admin/login - exchange the admin credential pair for a session token
//! - GET /api/admin/stats - usage aggregates (session required)
//! - POST /api/admin/create-key - issue a new integrator key (session required)

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

use crate::{
    app::AppState,
    error::AppError,
    models::{
        api_key::{CreateKeyRequest, CreateKeyResponse},
        stats::UsageStats,
    },
    services::registry,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub admin_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
}

/// Log in as the admin.
///
/// # Request Body
///
/// ```json
/// { "adminId": "admin", "password": "..." }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{ "success": true, "token": "<64 hex chars>" }`
/// - **Error (401)**: wrong credentials
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let token = state
        .sessions
        .login(&request.admin_id, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        success: true,
        token,
    }))
}

/// Usage aggregates for the dashboard.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "totalImages": 0,
///   "webUsage": 0,
///   "mobileUsage": 0,
///   "externalUsage": 0,
///   "apiKeys": [],
///   "externalSites": []
/// }
/// ```
pub async fn stats(State(state): State<AppState>) -> Result<Json<UsageStats>, AppError> {
    Ok(Json(state.aggregator.stats().await?))
}

/// Issue a new API key.
///
/// # Request Body
///
/// ```json
/// { "name": "Acme" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{ "success": true, "key": "sk_...", "name": "Acme" }`
/// - **Error (400)**: missing or blank name
pub async fn create_key(
    State(state): State<AppState>,
    body: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Result<Json<CreateKeyResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let created = registry::create_key(state.registry.as_ref(), request.name.as_deref()).await?;

    Ok(Json(CreateKeyResponse {
        success: true,
        key: created.key,
        name: created.name,
    }))
}
