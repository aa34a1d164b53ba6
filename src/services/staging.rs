//! Transient on-disk staging for uploaded images.
//!
//! A multipart field is streamed into a [`StagedImage`] before the pipeline reads it.
//! The staged file belongs to one request and is deleted when the value is dropped,
//! whichever way the request ends.

use bytes::Bytes;
use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Directory holding staged uploads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the staging directory if it is missing.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Open a new, empty staged file.
    pub fn begin(&self) -> io::Result<StagedImage> {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.dir)?
            .into_parts();

        Ok(StagedImage {
            path,
            file: tokio::fs::File::from_std(file),
            len: 0,
        })
    }

    /// Stage an in-memory image in one step.
    #[cfg(test)]
    pub async fn stage(&self, bytes: &[u8]) -> io::Result<StagedImage> {
        let mut staged = self.begin()?;
        staged.append(bytes).await?;
        Ok(staged)
    }
}

/// An uploaded image held on disk for the duration of one request.
#[derive(Debug)]
pub struct StagedImage {
    path: TempPath,
    file: tokio::fs::File,
    len: u64,
}

impl StagedImage {
    pub async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush pending writes and read the whole image back.
    pub async fn read_all(&mut self) -> io::Result<Bytes> {
        self.file.flush().await?;
        let bytes = tokio::fs::read(&*self.path).await?;
        Ok(Bytes::from(bytes))
    }
}
