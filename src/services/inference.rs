//! Client for the external background-removal service.
//!
//! The service takes a multipart body with a `file` field and answers
//! `{"image": "<hex-encoded PNG>"}`. It may also answer `200 OK` with
//! `{"error": "..."}`, which is treated like any other failure.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use crate::{error::AppError, models::image_format::ImageFormat};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request to inference service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference service reported an error: {0}")]
    Upstream(String),

    #[error("malformed inference response: {0}")]
    Malformed(String),
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        AppError::InferenceFailed(err.to_string())
    }
}

/// Background removal as seen by the pipeline.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Return the processed image bytes for `image`. Called once per request; no retries.
    async fn remove_background(&self, image: Bytes) -> Result<Bytes, InferenceError>;
}

#[derive(Debug, Deserialize)]
struct RemovalResponse {
    image: Option<String>,
    error: Option<String>,
}

/// HTTP implementation of [`InferenceService`].
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpInferenceClient {
    /// Build a client posting to `endpoint`. `timeout` bounds each call end to end.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl InferenceService for HttpInferenceClient {
    async fn remove_background(&self, image: Bytes) -> Result<Bytes, InferenceError> {
        let format = ImageFormat::sniff(&image);
        let part = Part::bytes(image.to_vec())
            .file_name(format!("upload.{}", format.extension))
            .mime_str(format.mime)?;
        let form = Form::new().part("file", part);

        tracing::debug!(endpoint = %self.endpoint, bytes = image.len(), "sending image to inference service");

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let payload: RemovalResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;

        decode_payload(payload)
    }
}

fn decode_payload(payload: RemovalResponse) -> Result<Bytes, InferenceError> {
    if let Some(error) = payload.error {
        return Err(InferenceError::Upstream(error));
    }

    let hex_image = payload
        .image
        .ok_or_else(|| InferenceError::Malformed("missing `image` field".to_string()))?;

    let decoded = hex::decode(hex_image.trim())
        .map_err(|e| InferenceError::Malformed(format!("`image` is not valid hex: {e}")))?;

    if decoded.is_empty() {
        return Err(InferenceError::Malformed("`image` is empty".to_string()));
    }

    Ok(Bytes::from(decoded))
}
