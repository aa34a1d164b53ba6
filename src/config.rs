//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct,
//! which is built once in `main` and shared with every component behind an `Arc`.

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// Where durable artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    /// Files under `ARTIFACT_DIR`, served by this process at `/artifacts`
    Local,
    /// Signed uploads to a Cloudinary account
    Cloudinary,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 5002
/// - `INFERENCE_URL` (optional): background-removal endpoint, defaults to `http://localhost:8000/remove-bg`
/// - `INFERENCE_TIMEOUT_SECS` (optional): defaults to 60
/// - `ARTIFACT_BACKEND` (optional): `local` or `cloudinary`, defaults to `local`
/// - `ARTIFACT_NAMESPACE` (optional): root folder for artifacts, defaults to `removebg`
/// - `ARTIFACT_DIR` (optional): local backend root, defaults to `./public/artifacts`
/// - `PUBLIC_BASE_URL` (optional): base of URLs handed out by the local backend
/// - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`: required for `cloudinary`
/// - `STORAGE_TIMEOUT_SECS` (optional): defaults to 30
/// - `STAGING_DIR` (optional): transient upload directory, defaults to `./uploads`
/// - `MAX_UPLOAD_BYTES` (optional): request body cap, defaults to 50 MiB
/// - `ADMIN_ID`, `ADMIN_PASSWORD` (optional): admin credential pair, default `admin`/`admin`
/// - `ADMIN_SESSION_TTL_SECS` (optional): defaults to 86400, at most one year
/// - `METERING_TIMEOUT_MS` (optional): wait for an API key counter update, defaults to 2000
/// - `BOOTSTRAP_API_KEYS` (optional): `key=Name,key2=Other Name`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,

    #[serde(default = "default_backend")]
    pub artifact_backend: ArtifactBackend,

    #[serde(default = "default_namespace")]
    pub artifact_namespace: String,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<String>,

    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_secs: u64,

    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_admin")]
    pub admin_id: String,

    #[serde(default = "default_admin")]
    pub admin_password: String,

    #[serde(default = "default_session_ttl")]
    pub admin_session_ttl_secs: u64,

    #[serde(default = "default_metering_timeout")]
    pub metering_timeout_ms: u64,

    pub bootstrap_api_keys: Option<String>,
}

fn default_port() -> u16 {
    5002
}

fn default_inference_url() -> String {
    "http://localhost:8000/remove-bg".to_string()
}

fn default_inference_timeout() -> u64 {
    60
}

fn default_backend() -> ArtifactBackend {
    ArtifactBackend::Local
}

fn default_namespace() -> String {
    "removebg".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./public/artifacts")
}

fn default_public_base_url() -> String {
    "http://localhost:5002".to_string()
}

fn default_storage_timeout() -> u64 {
    30
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

/// 50 MiB
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_session_ttl() -> u64 {
    86_400
}

/// One year.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 86_400;

fn default_metering_timeout() -> u64 {
    2_000
}

/// Configuration that parsed but cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error("ARTIFACT_BACKEND=cloudinary requires {0}")]
    MissingCloudinary(&'static str),

    #[error("BOOTSTRAP_API_KEYS entry `{0}` is not of the form key=Name")]
    InvalidBootstrapEntry(String),

    #[error("ADMIN_SESSION_TTL_SECS={0} exceeds the maximum of {MAX_SESSION_TTL_SECS}")]
    SessionTtlOutOfRange(u64),
}

/// Cloudinary credentials, present only when the cloudinary backend is selected.
#[derive(Debug, Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - The values are inconsistent (see [`Config::validate`])
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field rules envy cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.inference_url).map_err(|source| ConfigError::InvalidUrl {
            name: "INFERENCE_URL",
            source,
        })?;
        url::Url::parse(&self.public_base_url).map_err(|source| ConfigError::InvalidUrl {
            name: "PUBLIC_BASE_URL",
            source,
        })?;

        if self.artifact_backend == ArtifactBackend::Cloudinary {
            self.cloudinary()?;
        }

        if self.admin_session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::SessionTtlOutOfRange(self.admin_session_ttl_secs));
        }

        self.bootstrap_keys()?;
        Ok(())
    }

    pub fn cloudinary(&self) -> Result<CloudinaryCredentials, ConfigError> {
        let cloud_name = self
            .cloudinary_cloud_name
            .clone()
            .ok_or(ConfigError::MissingCloudinary("CLOUDINARY_CLOUD_NAME"))?;
        let api_key = self
            .cloudinary_api_key
            .clone()
            .ok_or(ConfigError::MissingCloudinary("CLOUDINARY_API_KEY"))?;
        let api_secret = self
            .cloudinary_api_secret
            .clone()
            .ok_or(ConfigError::MissingCloudinary("CLOUDINARY_API_SECRET"))?;

        Ok(CloudinaryCredentials {
            cloud_name,
            api_key,
            api_secret,
        })
    }

    /// Parse `BOOTSTRAP_API_KEYS` into `(key, name)` pairs.
    pub fn bootstrap_keys(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let Some(raw) = self.bootstrap_api_keys.as_deref() else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (key, name) = entry
                    .split_once('=')
                    .ok_or_else(|| ConfigError::InvalidBootstrapEntry(entry.to_string()))?;
                let (key, name) = (key.trim(), name.trim());
                if key.is_empty() || name.is_empty() {
                    return Err(ConfigError::InvalidBootstrapEntry(entry.to_string()));
                }
                Ok((key.to_string(), name.to_string()))
            })
            .collect()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    /// Session lifetime, clamped to [`MAX_SESSION_TTL_SECS`].
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.admin_session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }

    pub fn metering_timeout(&self) -> Duration {
        Duration::from_millis(self.metering_timeout_ms)
    }

    /// Whether the admin pair was left at its well-known default.
    pub fn uses_default_admin(&self) -> bool {
        self.admin_id == default_admin() && self.admin_password == default_admin()
    }

    /// A configuration suitable for unit tests; no environment is read.
    #[cfg(test)]
    pub fn for_tests(staging_dir: PathBuf) -> Self {
        Self {
            database_url: "postgres://localhost/test".to_string(),
            server_port: default_port(),
            inference_url: default_inference_url(),
            inference_timeout_secs: 5,
            artifact_backend: ArtifactBackend::Local,
            artifact_namespace: default_namespace(),
            artifact_dir: staging_dir.with_file_name("artifacts"),
            public_base_url: default_public_base_url(),
            cloudinary_cloud_name: None,
            cloudinary_api_key: None,
            cloudinary_api_secret: None,
            storage_timeout_secs: 5,
            staging_dir,
            max_upload_bytes: default_max_upload_bytes(),
            admin_id: "root".to_string(),
            admin_password: "hunter2".to_string(),
            admin_session_ttl_secs: 60,
            metering_timeout_ms: 500,
            bootstrap_api_keys: None,
        }
    }
}
