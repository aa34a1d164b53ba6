//! Record store connection pool and migrations.
//!
//! The ledger and the key registry share one PostgreSQL pool. Their tables are created by
//! the embedded migrations in `migrations/`.

use sqlx::{Pool, Postgres};

/// Type alias for the PostgreSQL connection pool shared by the stores.
pub type DbPool = Pool<Postgres>;

/// Create the PostgreSQL connection pool.
///
/// # Configuration
///
/// - Maximum connections: 5
/// - Connections are created lazily as needed
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server is unreachable.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Create `api_keys` and `usage_records` if they do not exist yet.
///
/// Applied migrations are tracked in `_sqlx_migrations`, so each file runs once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
