//! Shared application state and HTTP router construction.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    config::Config,
    handlers,
    middleware,
    services::{
        aggregator::AdminAggregator, ledger::UsageLedger, pipeline::IngestionPipeline,
        registry::KeyRegistry, sessions::SessionStore, staging::StagingArea,
    },
};

/// Everything handlers need, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<IngestionPipeline>,
    pub aggregator: Arc<AdminAggregator>,
    pub ledger: Arc<dyn UsageLedger>,
    pub registry: Arc<dyn KeyRegistry>,
    pub sessions: Arc<SessionStore>,
    pub staging: StagingArea,
}

pub fn build_router(state: AppState) -> Router {
    // Admin routes require a session token from /api/admin/login
    let admin_routes = Router::new()
        .route("/api/admin/stats", get(handlers::admin::stats))
        .route("/api/admin/create-key", post(handlers::admin::create_key))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/upload", post(handlers::images::upload))
        .route("/api/remove-bg", post(handlers::images::remove_bg))
        .route("/api/admin/login", post(handlers::admin::login))
        .merge(admin_routes)
        .nest_service("/artifacts", ServeDir::new(&state.config.artifact_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
