//! Usage ledger model.
//!
//! One `UsageRecord` is appended per completed request. Records are never updated or
//! deleted by this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Value stored in `processed_artifact_ref` when the processed image was returned to the
/// caller but not kept.
pub const NOT_RETAINED: &str = "not-retained";

/// Origin recorded when the caller sent neither `Origin` nor `Referer`.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Client class a request is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Web,
    Mobile,
    External,
}

impl SourceKind {
    /// Classify a request on the light path.
    ///
    /// Only the presence of a well-formed key header matters. Whether the key exists in
    /// the registry does not change the classification.
    pub fn for_light_path(has_key: bool) -> Self {
        if has_key {
            SourceKind::External
        } else {
            SourceKind::Mobile
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Mobile => "mobile",
            SourceKind::External => "external",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown usage source `{0}`")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(SourceKind::Web),
            "mobile" => Ok(SourceKind::Mobile),
            "external" => Ok(SourceKind::External),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

impl TryFrom<String> for SourceKind {
    type Error = UnknownSource;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents a row of the `usage_records` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,

    /// Blob storage URL of the uploaded image, if it was kept
    pub original_artifact_ref: Option<String>,

    /// Blob storage URL of the processed image, or [`NOT_RETAINED`]
    pub processed_artifact_ref: Option<String>,

    #[sqlx(try_from = "String")]
    pub source: SourceKind,

    /// Raw key sent by the caller. It may not exist in the registry.
    pub api_key: Option<String>,

    pub origin: String,

    pub created_at: DateTime<Utc>,
}

/// Data for a record about to be appended; `id` and `created_at` are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRecord {
    pub original_artifact_ref: Option<String>,
    pub processed_artifact_ref: Option<String>,
    pub source: SourceKind,
    pub api_key: Option<String>,
    pub origin: String,
}
