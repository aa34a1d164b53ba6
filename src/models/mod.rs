//! Data models for records, keys, request attribution and dashboard responses.

/// Integrator API key model
pub mod api_key;
/// Magic-byte image detection
pub mod image_format;
/// Attribution extracted from request headers
pub mod request_meta;
/// Admin aggregation responses
pub mod stats;
/// Usage ledger record model
pub mod usage_record;
