//! Background-removal gateway - Main Application Entry Point
//!
//! Accepts image uploads from the web frontend, mobile apps and API-key integrators,
//! forwards them to the background-removal service, stores artifacts and records a
//! usage ledger entry per request. An admin surface aggregates the ledger.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Record Store**: PostgreSQL with sqlx (usage ledger and key registry)
//! - **Inference**: external HTTP service, multipart in, hex-encoded PNG out
//! - **Artifacts**: Cloudinary or the local filesystem
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Seed bootstrap API keys
//! 4. Build collaborators, pipeline and router
//! 5. Start server on configured port

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::{
    app::AppState,
    config::{ArtifactBackend, Config},
    services::{
        aggregator::AdminAggregator,
        artifact_store::{ArtifactFolders, ArtifactStore, CloudinaryStore, LocalArtifactStore},
        inference::HttpInferenceClient,
        ledger::{PgUsageLedger, UsageLedger},
        pipeline::IngestionPipeline,
        registry::{self, KeyRegistry, PgKeyRegistry},
        sessions::SessionStore,
        staging::StagingArea,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(backend = ?config.artifact_backend, "Configuration loaded");
    if config.uses_default_admin() {
        tracing::warn!("ADMIN_ID/ADMIN_PASSWORD are at their defaults, set them before exposing this server");
    }

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let ledger: Arc<dyn UsageLedger> = Arc::new(PgUsageLedger::new(pool.clone()));
    let key_registry: Arc<dyn KeyRegistry> = Arc::new(PgKeyRegistry::new(pool));

    let seeded = registry::seed_keys(key_registry.as_ref(), &config.bootstrap_keys()?).await?;
    if seeded > 0 {
        tracing::info!(seeded, "Bootstrap API keys created");
    }

    let artifacts: Arc<dyn ArtifactStore> = match config.artifact_backend {
        ArtifactBackend::Cloudinary => Arc::new(CloudinaryStore::new(
            config.cloudinary()?,
            config.storage_timeout(),
        )?),
        ArtifactBackend::Local => {
            tokio::fs::create_dir_all(&config.artifact_dir).await?;
            Arc::new(LocalArtifactStore::new(
                &config.artifact_dir,
                &config.public_base_url,
            ))
        }
    };

    let inference = Arc::new(HttpInferenceClient::new(
        config.inference_url.clone(),
        config.inference_timeout(),
    )?);

    let staging = StagingArea::new(&config.staging_dir);
    staging.ensure_dir().await?;
    tracing::info!(dir = %staging.dir().display(), "Staging directory ready");

    let pipeline = Arc::new(IngestionPipeline::new(
        inference,
        artifacts,
        ledger.clone(),
        key_registry.clone(),
        ArtifactFolders::new(&config.artifact_namespace),
    )
    .with_meter_timeout(config.metering_timeout()));
    let aggregator = Arc::new(AdminAggregator::new(ledger.clone(), key_registry.clone()));
    let sessions = Arc::new(SessionStore::new(
        config.admin_id.clone(),
        config.admin_password.clone(),
        config.session_ttl(),
    ));

    let state = AppState {
        config: config.clone(),
        pipeline,
        aggregator,
        ledger,
        registry: key_registry,
        sessions,
        staging,
    };
    let app = app::build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
