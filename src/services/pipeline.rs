//! Ingestion pipeline - forwards uploads to inference, stores artifacts, records usage.
//!
//! Two paths share validation and inference:
//!
//! - **Full** (`POST /upload`): both the original and the processed image are uploaded
//!   to blob storage and the record references them.
//! - **Light** (`POST /api/remove-bg`): the processed image goes straight back to the
//!   caller; only metadata is recorded.
//!
//! # Ordering
//!
//! Inference always finishes before any upload starts, so a failed inference leaves no
//! artifacts and no record behind. The two uploads then run concurrently. Metering runs
//! last so that failed requests are never counted against a key.
//!
//! # Staged uploads
//!
//! Both operations take ownership of the [`StagedImage`]; it is dropped, and its file
//! deleted, when the operation returns on any path.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        image_format::{self, ImageFormat},
        request_meta::RequestMeta,
        usage_record::{NOT_RETAINED, NewUsageRecord, SourceKind},
    },
    services::{
        artifact_store::{ArtifactFolders, ArtifactStore},
        inference::InferenceService,
        ledger::UsageLedger,
        metering::{self, Metered},
        registry::KeyRegistry,
        staging::StagedImage,
    },
};

/// Result of the full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullIngest {
    pub original: String,
    pub processed: String,
    pub record_id: Uuid,
}

/// Result of the light path.
#[derive(Debug, Clone)]
pub struct LightIngest {
    pub image: Bytes,
    pub source: SourceKind,
    /// `None` when the record could not be written; the image is returned regardless
    pub record_id: Option<Uuid>,
}

impl LightIngest {
    /// `data:<mime>;base64,<payload>` for direct use in an image element.
    pub fn data_uri(&self) -> String {
        let format = match ImageFormat::sniff(&self.image) {
            f if f.extension == "bin" => image_format::PNG,
            f => f,
        };
        format!("data:{};base64,{}", format.mime, STANDARD.encode(&self.image))
    }
}

/// How long a request waits for its key's counter update before giving up on it.
pub const DEFAULT_METER_TIMEOUT: Duration = Duration::from_secs(2);

pub struct IngestionPipeline {
    inference: Arc<dyn InferenceService>,
    artifacts: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn UsageLedger>,
    registry: Arc<dyn KeyRegistry>,
    folders: ArtifactFolders,
    meter_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        inference: Arc<dyn InferenceService>,
        artifacts: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn UsageLedger>,
        registry: Arc<dyn KeyRegistry>,
        folders: ArtifactFolders,
    ) -> Self {
        Self {
            inference,
            artifacts,
            ledger,
            registry,
            folders,
            meter_timeout: DEFAULT_METER_TIMEOUT,
        }
    }

    pub fn with_meter_timeout(mut self, timeout: Duration) -> Self {
        self.meter_timeout = timeout;
        self
    }

    /// Process an upload and keep both artifacts.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: no image, or an empty one
    /// - `InferenceFailed`: nothing was uploaded or recorded
    /// - `StorageFailed`: either upload failed; nothing was recorded
    /// - `Database`: the record could not be written
    pub async fn ingest_full(
        &self,
        upload: Option<StagedImage>,
        meta: &RequestMeta,
    ) -> Result<FullIngest, AppError> {
        let mut staged = require_image(upload)?;
        let original = staged.read_all().await?;

        let processed = self.inference.remove_background(original.clone()).await?;

        let (original_ref, processed_ref) = tokio::try_join!(
            self.artifacts.upload(&self.folders.originals, original),
            self.artifacts.upload(&self.folders.processed, processed),
        )?;

        let Metered { attribution, .. } = self.meter(meta).await;

        let record = self
            .ledger
            .append(NewUsageRecord {
                original_artifact_ref: Some(original_ref.clone()),
                processed_artifact_ref: Some(processed_ref.clone()),
                source: SourceKind::Web,
                api_key: attribution.api_key,
                origin: attribution.origin,
            })
            .await?;

        tracing::info!(record_id = %record.id, source = %record.source, "image processed and stored");

        Ok(FullIngest {
            original: original_ref,
            processed: processed_ref,
            record_id: record.id,
        })
    }

    /// Process an upload and hand the result back without keeping any artifact.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: no image, or an empty one
    /// - `InferenceFailed`: nothing was recorded
    pub async fn ingest_light(
        &self,
        upload: Option<StagedImage>,
        meta: &RequestMeta,
    ) -> Result<LightIngest, AppError> {
        let mut staged = require_image(upload)?;
        let original = staged.read_all().await?;

        let processed = self.inference.remove_background(original).await?;

        let source = SourceKind::for_light_path(meta.api_key.is_some());
        let Metered { attribution, .. } = self.meter(meta).await;

        let appended = self
            .ledger
            .append(NewUsageRecord {
                original_artifact_ref: None,
                processed_artifact_ref: Some(NOT_RETAINED.to_string()),
                source,
                api_key: attribution.api_key,
                origin: attribution.origin,
            })
            .await;

        let record_id = match appended {
            Ok(record) => {
                tracing::info!(record_id = %record.id, %source, "image processed");
                Some(record.id)
            }
            Err(e) => {
                tracing::error!(error = %e, %source, "failed to record usage, returning image anyway");
                None
            }
        };

        Ok(LightIngest {
            image: processed,
            source,
            record_id,
        })
    }

    async fn meter(&self, meta: &RequestMeta) -> Metered {
        let metered = metering::meter(self.registry.as_ref(), meta, self.meter_timeout).await;
        metered.log();
        metered
    }
}

fn require_image(upload: Option<StagedImage>) -> Result<StagedImage, AppError> {
    match upload {
        Some(staged) if !staged.is_empty() => Ok(staged),
        Some(_) => Err(AppError::InvalidRequest("Uploaded image is empty".to_string())),
        None => Err(AppError::InvalidRequest("No image uploaded".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::staging::StagingArea,
        testing::{
            FailingLedger, FailingRegistry, FakeInference, HangingRegistry, MemoryLedger,
            MemoryRegistry, RecordingArtifactStore, TINY_PNG, staged_files,
        },
    };
    use tempfile::TempDir;

    struct Harness {
        pipeline: IngestionPipeline,
        ledger: Arc<MemoryLedger>,
        registry: Arc<MemoryRegistry>,
        artifacts: Arc<RecordingArtifactStore>,
        staging: StagingArea,
        _dir: TempDir,
    }

    fn harness(inference: FakeInference, artifacts: RecordingArtifactStore) -> Harness {
        harness_with_registry(inference, artifacts, MemoryRegistry::with_key("sk_abc123", "Acme", 5))
    }

    fn harness_with_registry(
        inference: FakeInference,
        artifacts: RecordingArtifactStore,
        registry: MemoryRegistry,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(MemoryLedger::default());
        let registry = Arc::new(registry);
        let artifacts = Arc::new(artifacts);
        let pipeline = IngestionPipeline::new(
            Arc::new(inference),
            artifacts.clone(),
            ledger.clone(),
            registry.clone(),
            ArtifactFolders::new("removebg"),
        );
        Harness {
            pipeline,
            ledger,
            registry,
            artifacts,
            staging: StagingArea::new(dir.path()),
            _dir: dir,
        }
    }

    impl Harness {
        async fn upload(&self, bytes: &[u8]) -> Option<StagedImage> {
            Some(self.staging.stage(bytes).await.unwrap())
        }

        fn staged_files(&self) -> usize {
            staged_files(self.staging.dir())
        }
    }

    fn with_key(key: &str) -> RequestMeta {
        RequestMeta {
            api_key: Some(key.to_string()),
            origin: "https://acme.example".to_string(),
        }
    }

    #[tokio::test]
    async fn full_path_stores_both_artifacts_and_one_web_record() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        let out = h
            .pipeline
            .ingest_full(upload, &RequestMeta::anonymous())
            .await
            .unwrap();

        assert!(out.original.contains("removebg/originals"));
        assert!(out.processed.contains("removebg/processed"));

        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, out.record_id);
        assert_eq!(records[0].source, SourceKind::Web);
        assert_eq!(records[0].original_artifact_ref.as_deref(), Some(out.original.as_str()));
        assert_eq!(records[0].processed_artifact_ref.as_deref(), Some(out.processed.as_str()));
        assert_eq!(records[0].origin, "unknown");

        let uploads = h.artifacts.uploads();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.contains(&("removebg/originals".to_string(), Bytes::from_static(TINY_PNG))));
        assert!(uploads.contains(&(
            "removebg/processed".to_string(),
            Bytes::from_static(FakeInference::OUTPUT)
        )));
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn full_path_stays_web_with_a_key_and_meters_it() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        h.pipeline.ingest_full(upload, &with_key("sk_abc123")).await.unwrap();

        let records = h.ledger.records();
        assert_eq!(records[0].source, SourceKind::Web);
        assert_eq!(records[0].api_key.as_deref(), Some("sk_abc123"));
        assert_eq!(h.registry.get("sk_abc123").unwrap().usage_count, 6);
    }

    #[tokio::test]
    async fn missing_image_is_invalid() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());

        let err = h
            .pipeline
            .ingest_full(None, &RequestMeta::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(h.ledger.records().len(), 0);
    }

    #[tokio::test]
    async fn empty_image_is_invalid_and_unstaged() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(b"").await;
        assert_eq!(h.staged_files(), 1);

        let err = h
            .pipeline
            .ingest_light(upload, &RequestMeta::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn inference_failure_uploads_and_records_nothing() {
        let h = harness(FakeInference::failing(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        let err = h
            .pipeline
            .ingest_full(upload, &with_key("sk_abc123"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InferenceFailed(_)));
        assert!(h.artifacts.uploads().is_empty());
        assert!(h.ledger.records().is_empty());
        assert_eq!(h.registry.get("sk_abc123").unwrap().usage_count, 5);
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn light_inference_failure_records_nothing() {
        let h = harness(FakeInference::failing(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        let err = h
            .pipeline
            .ingest_light(upload, &RequestMeta::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InferenceFailed(_)));
        assert!(h.ledger.records().is_empty());
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn storage_failure_aborts_without_record() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::failing_on("removebg/processed"));
        let upload = h.upload(TINY_PNG).await;

        let err = h
            .pipeline
            .ingest_full(upload, &RequestMeta::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageFailed(_)));
        assert!(h.ledger.records().is_empty());
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn light_path_without_key_is_mobile() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        let out = h
            .pipeline
            .ingest_light(upload, &RequestMeta::anonymous())
            .await
            .unwrap();

        assert_eq!(&out.image[..], FakeInference::OUTPUT);
        assert_eq!(out.source, SourceKind::Mobile);

        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].id), out.record_id);
        assert_eq!(records[0].source, SourceKind::Mobile);
        assert_eq!(records[0].api_key, None);
        assert_eq!(records[0].original_artifact_ref, None);
        assert_eq!(records[0].processed_artifact_ref.as_deref(), Some(NOT_RETAINED));
        assert!(h.artifacts.uploads().is_empty());
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn light_path_with_known_key_is_external_and_counted() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        let out = h.pipeline.ingest_light(upload, &with_key("sk_abc123")).await.unwrap();

        assert_eq!(out.source, SourceKind::External);
        assert_eq!(h.registry.get("sk_abc123").unwrap().usage_count, 6);
        let records = h.ledger.records();
        assert_eq!(records[0].source, SourceKind::External);
        assert_eq!(records[0].origin, "https://acme.example");
    }

    #[tokio::test]
    async fn light_path_with_unknown_key_is_still_external() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let upload = h.upload(TINY_PNG).await;

        h.pipeline.ingest_light(upload, &with_key("sk_nobody")).await.unwrap();

        let records = h.ledger.records();
        assert_eq!(records[0].source, SourceKind::External);
        assert_eq!(records[0].api_key.as_deref(), Some("sk_nobody"));
        assert!(h.registry.get("sk_nobody").is_none());
    }

    #[tokio::test]
    async fn registry_outage_does_not_fail_the_request() {
        let h = harness_with_registry(
            FakeInference::succeeding(),
            RecordingArtifactStore::default(),
            MemoryRegistry::default(),
        );
        let pipeline = IngestionPipeline::new(
            Arc::new(FakeInference::succeeding()),
            h.artifacts.clone(),
            h.ledger.clone(),
            Arc::new(FailingRegistry),
            ArtifactFolders::new("removebg"),
        );
        let upload = h.upload(TINY_PNG).await;

        let out = pipeline.ingest_light(upload, &with_key("sk_abc123")).await.unwrap();

        assert_eq!(out.source, SourceKind::External);
        assert_eq!(h.ledger.records().len(), 1);
    }

    #[tokio::test]
    async fn stalled_registry_does_not_hold_up_the_request() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let pipeline = IngestionPipeline::new(
            Arc::new(FakeInference::succeeding()),
            h.artifacts.clone(),
            h.ledger.clone(),
            Arc::new(HangingRegistry),
            ArtifactFolders::new("removebg"),
        )
        .with_meter_timeout(Duration::from_millis(50));
        let upload = h.upload(TINY_PNG).await;

        let out = tokio::time::timeout(
            Duration::from_secs(3),
            pipeline.ingest_light(upload, &with_key("sk_abc123")),
        )
        .await
        .expect("request must not wait on the registry")
        .unwrap();

        assert_eq!(&out.image[..], FakeInference::OUTPUT);
        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, SourceKind::External);
        assert_eq!(records[0].api_key.as_deref(), Some("sk_abc123"));
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn light_path_returns_image_when_ledger_is_down() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let pipeline = IngestionPipeline::new(
            Arc::new(FakeInference::succeeding()),
            h.artifacts.clone(),
            Arc::new(FailingLedger),
            h.registry.clone(),
            ArtifactFolders::new("removebg"),
        );
        let upload = h.upload(TINY_PNG).await;

        let out = pipeline.ingest_light(upload, &with_key("sk_abc123")).await.unwrap();

        assert_eq!(&out.image[..], FakeInference::OUTPUT);
        assert_eq!(out.source, SourceKind::External);
        assert_eq!(out.record_id, None);
        assert!(out.data_uri().starts_with("data:image/png;base64,"));
        assert_eq!(h.registry.get("sk_abc123").unwrap().usage_count, 6);
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn full_path_fails_when_ledger_is_down() {
        let h = harness(FakeInference::succeeding(), RecordingArtifactStore::default());
        let pipeline = IngestionPipeline::new(
            Arc::new(FakeInference::succeeding()),
            h.artifacts.clone(),
            Arc::new(FailingLedger),
            h.registry.clone(),
            ArtifactFolders::new("removebg"),
        );
        let upload = h.upload(TINY_PNG).await;

        let err = pipeline
            .ingest_full(upload, &RequestMeta::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn concurrent_light_requests_count_every_use() {
        let h = Arc::new(harness(FakeInference::succeeding(), RecordingArtifactStore::default()));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                let upload = h.upload(TINY_PNG).await;
                h.pipeline.ingest_light(upload, &with_key("sk_abc123")).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(h.registry.get("sk_abc123").unwrap().usage_count, 25);
        assert_eq!(h.ledger.records().len(), 20);
        assert_eq!(h.staged_files(), 0);
    }

    #[test]
    fn data_uri_defaults_to_png() {
        let light = LightIngest {
            image: Bytes::from_static(b"abc"),
            source: SourceKind::Mobile,
            record_id: None,
        };
        assert_eq!(light.data_uri(), "data:image/png;base64,YWJj");
    }
}
