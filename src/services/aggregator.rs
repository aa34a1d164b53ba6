//! Read-only dashboard queries over the ledger and the key registry.

use std::sync::Arc;

use crate::{
    error::AppError,
    models::stats::UsageStats,
    services::{ledger::UsageLedger, registry::KeyRegistry},
};

pub struct AdminAggregator {
    ledger: Arc<dyn UsageLedger>,
    registry: Arc<dyn KeyRegistry>,
}

impl AdminAggregator {
    pub fn new(ledger: Arc<dyn UsageLedger>, registry: Arc<dyn KeyRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Totals, per-source counts, keys by usage and external origins by volume.
    ///
    /// An empty store yields zero counts and empty lists.
    pub async fn stats(&self) -> Result<UsageStats, AppError> {
        let (total_images, by_source, api_keys, external_sites) = tokio::try_join!(
            self.ledger.count_all(),
            self.ledger.count_by_source(),
            self.registry.list_by_usage(),
            self.ledger.external_origins(),
        )?;

        Ok(UsageStats {
            total_images,
            web_usage: by_source.web,
            mobile_usage: by_source.mobile,
            external_usage: by_source.external,
            api_keys,
            external_sites,
        })
    }
}
