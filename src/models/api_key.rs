//! Integrator API key model.
//!
//! Keys are bearer tokens compared verbatim. They carry a usage counter that the
//! ingestion pipeline bumps on every request presenting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of keys generated by `POST /api/admin/create-key`.
pub const KEY_PREFIX: &str = "sk_";

/// Represents a row of the `api_keys` table.
///
/// # Database Table
///
/// - `key`: the token itself (primary key)
/// - `name`: integrator or project label
/// - `usage_count`: incremented atomically per metered request
/// - `last_used`: overwritten per metered request
/// - `is_active`: stored, not consulted when metering
/// - `created_at`: set once on insert
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub key: String,

    pub name: String,

    pub usage_count: i64,

    /// `None` until the key is first metered
    pub last_used: Option<DateTime<Utc>>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/admin/create-key`.
///
/// ```json
/// { "name": "Acme" }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Response body for `POST /api/admin/create-key`.
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub success: bool,
    pub key: String,
    pub name: String,
}
