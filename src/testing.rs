//! In-memory stand-ins for the pipeline's collaborators, used by unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
    time::Duration,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        api_key::ApiKey,
        stats::{OriginCount, SourceCounts},
        usage_record::{NewUsageRecord, SourceKind, UsageRecord},
    },
    services::{
        artifact_store::{ArtifactStore, StorageError},
        inference::{InferenceError, InferenceService},
        ledger::UsageLedger,
        registry::KeyRegistry,
    },
};

/// A 10x10 red RGB PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x0a, 0x08, 0x02, 0x00, 0x00, 0x00, 0x02, 0x50, 0x58,
    0xea, 0x00, 0x00, 0x00, 0x12, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0xf8, 0xcf, 0xc0, 0x80,
    0x07, 0x31, 0x8c, 0x4a, 0x63, 0x43, 0x00, 0xb7, 0xca, 0x63, 0x9d, 0xd6, 0xd5, 0xef, 0x74, 0x00,
    0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Number of entries in a staging directory.
pub fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryLedger {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn append(&self, record: NewUsageRecord) -> Result<UsageRecord, AppError> {
        let record = UsageRecord {
            id: Uuid::new_v4(),
            original_artifact_ref: record.original_artifact_ref,
            processed_artifact_ref: record.processed_artifact_ref,
            source: record.source,
            api_key: record.api_key,
            origin: record.origin,
            created_at: Utc::now(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn count_all(&self) -> Result<i64, AppError> {
        Ok(self.records.lock().unwrap().len() as i64)
    }

    async fn count_by_source(&self) -> Result<SourceCounts, AppError> {
        let mut counts = SourceCounts::default();
        for record in self.records.lock().unwrap().iter() {
            match record.source {
                SourceKind::Web => counts.web += 1,
                SourceKind::Mobile => counts.mobile += 1,
                SourceKind::External => counts.external += 1,
            }
        }
        Ok(counts)
    }

    async fn external_origins(&self) -> Result<Vec<OriginCount>, AppError> {
        let mut by_origin: HashMap<String, i64> = HashMap::new();
        for record in self.records.lock().unwrap().iter() {
            if record.source == SourceKind::External {
                *by_origin.entry(record.origin.clone()).or_default() += 1;
            }
        }

        let mut origins: Vec<_> = by_origin
            .into_iter()
            .map(|(origin, count)| OriginCount { origin, count })
            .collect();
        origins.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.origin.cmp(&b.origin)));
        Ok(origins)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// A ledger whose every call fails, as if the database were down.
#[derive(Debug, Default)]
pub struct FailingLedger;

#[async_trait]
impl UsageLedger for FailingLedger {
    async fn append(&self, _record: NewUsageRecord) -> Result<UsageRecord, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn count_all(&self) -> Result<i64, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn count_by_source(&self) -> Result<SourceCounts, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn external_origins(&self) -> Result<Vec<OriginCount>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    keys: Mutex<Vec<ApiKey>>,
}

impl MemoryRegistry {
    pub fn with_key(key: &str, name: &str, usage_count: i64) -> Self {
        let registry = Self::default();
        registry.keys.lock().unwrap().push(ApiKey {
            key: key.to_string(),
            name: name.to_string(),
            usage_count,
            last_used: None,
            is_active: true,
            created_at: Utc::now(),
        });
        registry
    }

    pub fn get(&self, key: &str) -> Option<ApiKey> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.key == key)
            .cloned()
    }
}

#[async_trait]
impl KeyRegistry for MemoryRegistry {
    async fn insert(&self, key: &str, name: &str) -> Result<Option<ApiKey>, AppError> {
        let mut keys = self.keys.lock().unwrap();
        if keys.iter().any(|k| k.key == key) {
            return Ok(None);
        }
        let created = ApiKey {
            key: key.to_string(),
            name: name.to_string(),
            usage_count: 0,
            last_used: None,
            is_active: true,
            created_at: Utc::now(),
        };
        keys.push(created.clone());
        Ok(Some(created))
    }

    async fn increment_usage(&self, key: &str) -> Result<bool, AppError> {
        let mut keys = self.keys.lock().unwrap();
        match keys.iter_mut().find(|k| k.key == key) {
            Some(found) => {
                found.usage_count += 1;
                found.last_used = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_by_usage(&self) -> Result<Vec<ApiKey>, AppError> {
        let mut keys = self.keys.lock().unwrap().clone();
        keys.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(keys)
    }
}

/// A registry whose every call fails, as if the database were down.
#[derive(Debug, Default)]
pub struct FailingRegistry;

#[async_trait]
impl KeyRegistry for FailingRegistry {
    async fn insert(&self, _key: &str, _name: &str) -> Result<Option<ApiKey>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn increment_usage(&self, _key: &str) -> Result<bool, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list_by_usage(&self) -> Result<Vec<ApiKey>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// A registry that never answers counter updates, as if its connections were stuck.
#[derive(Debug, Default)]
pub struct HangingRegistry;

#[async_trait]
impl KeyRegistry for HangingRegistry {
    async fn insert(&self, _key: &str, _name: &str) -> Result<Option<ApiKey>, AppError> {
        std::future::pending().await
    }

    async fn increment_usage(&self, _key: &str) -> Result<bool, AppError> {
        std::future::pending().await
    }

    async fn list_by_usage(&self) -> Result<Vec<ApiKey>, AppError> {
        std::future::pending().await
    }
}

#[derive(Debug, Clone)]
pub struct FakeInference {
    fail: bool,
    delay: Option<Duration>,
}

impl FakeInference {
    pub const OUTPUT: &'static [u8] = b"\x89PNG\r\n\x1a\nbackground-removed";

    pub fn succeeding() -> Self {
        Self {
            fail: false,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            delay: None,
        }
    }

    /// Succeeds after `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            fail: false,
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn remove_background(&self, _image: Bytes) -> Result<Bytes, InferenceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(InferenceError::Status {
                status: 500,
                body: "model crashed".to_string(),
            });
        }
        Ok(Bytes::from_static(Self::OUTPUT))
    }
}

/// Records uploads and hands out predictable URLs.
#[derive(Debug, Default)]
pub struct RecordingArtifactStore {
    fail_folder: Option<String>,
    uploads: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingArtifactStore {
    pub fn failing_on(folder: &str) -> Self {
        Self {
            fail_folder: Some(folder.to_string()),
            uploads: Mutex::default(),
        }
    }

    pub fn uploads(&self) -> Vec<(String, Bytes)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for RecordingArtifactStore {
    async fn upload(&self, folder: &str, bytes: Bytes) -> Result<String, StorageError> {
        if self.fail_folder.as_deref() == Some(folder) {
            return Err(StorageError::Status {
                status: 500,
                body: "bucket unavailable".to_string(),
            });
        }
        self.uploads.lock().unwrap().push((folder.to_string(), bytes));
        Ok(format!("https://blobs.example/{folder}/{}.png", Uuid::new_v4()))
    }
}
