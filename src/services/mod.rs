//! Business logic services.
//!
//! Services hold the ingestion pipeline and the collaborators it drives, separated from
//! HTTP handlers. External systems sit behind traits so they can be swapped or faked.

pub mod aggregator;
pub mod artifact_store;
pub mod inference;
pub mod ledger;
pub mod metering;
pub mod pipeline;
pub mod registry;
pub mod sessions;
pub mod staging;
