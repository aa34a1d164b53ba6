//! Admin dashboard response types.

use serde::Serialize;

use crate::models::api_key::ApiKey;

/// Record counts per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCounts {
    pub web: i64,
    pub mobile: i64,
    pub external: i64,
}

/// Number of `external` records attributed to one origin.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct OriginCount {
    pub origin: String,
    pub count: i64,
}

/// Response body for `GET /api/admin/stats`.
///
/// ```json
/// {
///   "totalImages": 3,
///   "webUsage": 1,
///   "mobileUsage": 1,
///   "externalUsage": 1,
///   "apiKeys": [{ "key": "sk_...", "name": "Acme", "usageCount": 1, ... }],
///   "externalSites": [{ "origin": "https://acme.example", "count": 1 }]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_images: i64,
    pub web_usage: i64,
    pub mobile_usage: i64,
    pub external_usage: i64,
    pub api_keys: Vec<ApiKey>,
    pub external_sites: Vec<OriginCount>,
}
