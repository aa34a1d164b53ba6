//! Attribution data read from request headers.

use axum::http::{HeaderMap, header};

use crate::models::usage_record::UNKNOWN_ORIGIN;

/// Header carrying an integrator API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const MAX_KEY_LEN: usize = 256;

/// What a request says about who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    /// Well-formed key from `x-api-key`, not checked against the registry
    pub api_key: Option<String>,

    /// `Origin`, else `Referer`, else `"unknown"`
    pub origin: String,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(well_formed_key);

        let origin = [header::ORIGIN, header::REFERER]
            .iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_ORIGIN)
            .to_string();

        Self { api_key, origin }
    }

    /// Metadata for a request that carried no attribution headers.
    #[cfg(test)]
    pub fn anonymous() -> Self {
        Self {
            api_key: None,
            origin: UNKNOWN_ORIGIN.to_string(),
        }
    }
}

/// A key is well-formed when it is non-empty printable ASCII without whitespace.
fn well_formed_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    let ok = !key.is_empty() && key.len() <= MAX_KEY_LEN && key.bytes().all(|b| b.is_ascii_graphic());
    ok.then(|| key.to_string())
}
