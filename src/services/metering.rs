//! Attributing requests to API keys.
//!
//! Metering is best effort. [`meter`] has no error path: whatever happens to the counter
//! update is reported in [`MeterOutcome`], which callers only log. A registry that does not
//! answer within the deadline is reported as failed, so it cannot hold up the request.

use std::time::Duration;

use crate::{models::request_meta::RequestMeta, services::registry::KeyRegistry};

/// Who a request is attributed to, as written into its usage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub api_key: Option<String>,
    pub origin: String,
}

/// What happened to the key's counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeterOutcome {
    /// No key was presented
    Anonymous,
    /// The key's counter was incremented
    Counted,
    /// The key is not in the registry; nothing was counted
    UnknownKey,
    /// The registry could not be updated
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metered {
    pub attribution: Attribution,
    pub outcome: MeterOutcome,
}

impl Metered {
    pub fn log(&self) {
        let redacted = self.attribution.api_key.as_deref().map(redact);
        let key = redacted.as_deref();
        match &self.outcome {
            MeterOutcome::Anonymous => {}
            MeterOutcome::Counted => tracing::debug!(key, "api key usage counted"),
            MeterOutcome::UnknownKey => {
                tracing::warn!(key, origin = %self.attribution.origin, "request used an unknown api key")
            }
            MeterOutcome::Failed(reason) => {
                tracing::warn!(key, %reason, "failed to update api key usage")
            }
        }
    }
}

/// Count the request against its key, if any, waiting at most `deadline` for the registry.
pub async fn meter(registry: &dyn KeyRegistry, meta: &RequestMeta, deadline: Duration) -> Metered {
    let outcome = match meta.api_key.as_deref() {
        None => MeterOutcome::Anonymous,
        Some(key) => match tokio::time::timeout(deadline, registry.increment_usage(key)).await {
            Ok(Ok(true)) => MeterOutcome::Counted,
            Ok(Ok(false)) => MeterOutcome::UnknownKey,
            Ok(Err(e)) => MeterOutcome::Failed(e.to_string()),
            Err(_) => MeterOutcome::Failed("timed out".to_string()),
        },
    };

    Metered {
        attribution: Attribution {
            api_key: meta.api_key.clone(),
            origin: meta.origin.clone(),
        },
        outcome,
    }
}

/// Keep enough of a key to recognise it in logs.
fn redact(key: &str) -> String {
    let visible: String = key.chars().take(6).collect();
    format!("{visible}…")
}
