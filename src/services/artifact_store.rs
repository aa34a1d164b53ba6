//! Durable artifact storage.
//!
//! Two backends implement [`ArtifactStore`]:
//! - [`CloudinaryStore`]: signed uploads to a Cloudinary account
//! - [`LocalArtifactStore`]: files on disk, served by this process under `/artifacts`
//!
//! Each upload is independent. Nothing is shared between the original and the processed
//! upload of one request.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{path::PathBuf, time::Duration};
use uuid::Uuid;

use crate::{config::CloudinaryCredentials, error::AppError, models::image_format::ImageFormat};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("blob storage returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed blob storage response: {0}")]
    Malformed(String),

    #[error("local artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageFailed(err.to_string())
    }
}

/// Blob storage as seen by the pipeline.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `folder` and return a public URL for them.
    async fn upload(&self, folder: &str, bytes: Bytes) -> Result<String, StorageError>;
}

/// Folder names for the two artifacts of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFolders {
    pub originals: String,
    pub processed: String,
}

impl ArtifactFolders {
    pub fn new(namespace: &str) -> Self {
        let namespace = namespace.trim_matches('/');
        Self {
            originals: format!("{namespace}/originals"),
            processed: format!("{namespace}/processed"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    secure_url: Option<String>,
}

/// Uploads to `https://api.cloudinary.com/v1_1/<cloud>/image/upload`.
///
/// Requests are signed with SHA-256, so the account's signature algorithm must be set
/// to SHA-256.
#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    client: reqwest::Client,
    upload_url: String,
    credentials: CloudinaryCredentials,
}

impl CloudinaryStore {
    pub fn new(credentials: CloudinaryCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let upload_url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            credentials.cloud_name
        );
        Self::with_upload_url(credentials, upload_url, timeout)
    }

    /// Same as [`CloudinaryStore::new`] with an explicit upload endpoint.
    pub fn with_upload_url(
        credentials: CloudinaryCredentials,
        upload_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            upload_url: upload_url.into(),
            credentials,
        })
    }

    fn signature(&self, folder: &str, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(string_to_sign(folder, timestamp).as_bytes());
        hasher.update(self.credentials.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Signed parameters sorted by name and joined as `k=v&k=v`; the secret is appended after.
fn string_to_sign(folder: &str, timestamp: i64) -> String {
    format!("folder={folder}&timestamp={timestamp}")
}

#[async_trait]
impl ArtifactStore for CloudinaryStore {
    async fn upload(&self, folder: &str, bytes: Bytes) -> Result<String, StorageError> {
        let timestamp = Utc::now().timestamp();
        let format = ImageFormat::sniff(&bytes);
        let file = Part::bytes(bytes.to_vec())
            .file_name(format!("artifact.{}", format.extension))
            .mime_str(format.mime)?;

        let form = Form::new()
            .text("folder", folder.to_string())
            .text("timestamp", timestamp.to_string())
            .text("api_key", self.credentials.api_key.clone())
            .text("signature", self.signature(folder, timestamp))
            .part("file", file);

        let response = self.client.post(&self.upload_url).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status { status, body });
        }

        let uploaded: CloudinaryUpload = response
            .json()
            .await
            .map_err(|e| StorageError::Malformed(e.to_string()))?;

        let url = uploaded
            .secure_url
            .ok_or_else(|| StorageError::Malformed("missing `secure_url`".to_string()))?;

        tracing::debug!(%folder, %url, "artifact uploaded to cloudinary");
        Ok(url)
    }
}

/// Writes `<root>/<folder>/<uuid>.<ext>` and returns `<base_url>/artifacts/<folder>/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, folder: &str, bytes: Bytes) -> Result<String, StorageError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), ImageFormat::sniff(&bytes).extension);
        tokio::fs::write(dir.join(&file_name), &bytes).await?;

        let url = format!("{}/artifacts/{folder}/{file_name}", self.base_url);
        tracing::debug!(%folder, %url, "artifact written locally");
        Ok(url)
    }
}
