//! Image ingestion HTTP handlers.
//!
//! - POST /upload - web client, keeps original and processed artifacts
//! - POST /api/remove-bg - mobile apps and integrators, returns the image inline
//!
//! Both take a multipart body whose `image` field holds the picture, plus the optional
//! `x-api-key` and `Origin`/`Referer` headers.
//!
//! Once the upload is staged, processing runs on its own task. A client that disconnects
//! does not cancel the inference call or the ledger write.

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::HeaderMap,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::request_meta::RequestMeta,
    services::staging::{StagedImage, StagingArea},
};

/// Multipart field carrying the uploaded image.
const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub original: String,
    pub processed: String,
    pub record_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RemoveBgResponse {
    pub success: bool,
    /// `data:image/png;base64,...`
    pub image: String,
}

/// Process an image and keep both versions.
///
/// # Endpoint
///
/// `POST /upload`
///
/// # Response
///
/// - **Success (200 OK)**:
///
/// ```json
/// {
///   "success": true,
///   "original": "https://.../removebg/originals/....png",
///   "processed": "https://.../removebg/processed/....png",
///   "recordId": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
///
/// - **Error (400)**: no `image` field
/// - **Error (502)**: inference or storage failed
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let meta = RequestMeta::from_headers(&headers);
    let staged = stage_image(&state.staging, multipart).await?;

    let pipeline = Arc::clone(&state.pipeline);
    let stored = detached(async move { pipeline.ingest_full(staged, &meta).await }).await?;

    Ok(Json(UploadResponse {
        success: true,
        original: stored.original,
        processed: stored.processed,
        record_id: stored.record_id,
    }))
}

/// Process an image and return it inline without storing it.
///
/// # Endpoint
///
/// `POST /api/remove-bg`
///
/// # Attribution
///
/// Requests with an `x-api-key` header are recorded as `external` and counted against
/// the key; requests without one are recorded as `mobile`.
///
/// # Response
///
/// ```json
/// { "success": true, "image": "data:image/png;base64,iVBORw0..." }
/// ```
pub async fn remove_bg(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RemoveBgResponse>, AppError> {
    let meta = RequestMeta::from_headers(&headers);
    let staged = stage_image(&state.staging, multipart).await?;

    let pipeline = Arc::clone(&state.pipeline);
    let processed = detached(async move { pipeline.ingest_light(staged, &meta).await }).await?;

    Ok(Json(RemoveBgResponse {
        success: true,
        image: processed.data_uri(),
    }))
}

/// Stream the `image` field to a staged file. Other fields are drained and ignored.
///
/// Returns `Ok(None)` when the body has no `image` field.
async fn stage_image(
    staging: &StagingArea,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<StagedImage>, AppError> {
    let mut multipart =
        multipart.map_err(|e| AppError::InvalidRequest(format!("Expected multipart form data: {e}")))?;

    let mut staged: Option<StagedImage> = None;
    while let Some(mut field) = multipart.next_field().await.map_err(invalid_multipart)? {
        if field.name() != Some(IMAGE_FIELD) || staged.is_some() {
            continue;
        }

        let mut image = staging.begin()?;
        while let Some(chunk) = field.chunk().await.map_err(invalid_multipart)? {
            image.append(&chunk).await?;
        }
        tracing::debug!(bytes = image.len(), "image staged");
        staged = Some(image);
    }

    Ok(staged)
}

/// Run `work` to completion on a separate task, even if the caller stops waiting.
async fn detached<T, F>(work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AppError>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("ingestion task failed: {e}")))?
}

fn invalid_multipart(err: MultipartError) -> AppError {
    AppError::InvalidRequest(format!("Invalid multipart body: {}", err.body_text()))
}
