//! API key registry: creation, seeding, metering counters and listing.

use async_trait::async_trait;

use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKey, KEY_PREFIX},
};

/// Attempts at generating a key that does not collide with an existing one.
const CREATE_ATTEMPTS: usize = 3;

const MAX_NAME_LEN: usize = 200;

/// Storage operations on API keys.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Insert a key with zeroed counters. Returns `None` if the key already exists.
    async fn insert(&self, key: &str, name: &str) -> Result<Option<ApiKey>, AppError>;

    /// Atomically add one to `usage_count` and set `last_used` to now.
    ///
    /// Returns `false` if no such key exists.
    async fn increment_usage(&self, key: &str) -> Result<bool, AppError>;

    /// All keys, most used first.
    async fn list_by_usage(&self) -> Result<Vec<ApiKey>, AppError>;
}

/// PostgreSQL implementation of [`KeyRegistry`].
#[derive(Debug, Clone)]
pub struct PgKeyRegistry {
    pool: DbPool,
}

impl PgKeyRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRegistry for PgKeyRegistry {
    async fn insert(&self, key: &str, name: &str) -> Result<Option<ApiKey>, AppError> {
        let created = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (key, name)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            RETURNING key, name, usage_count, last_used, is_active, created_at
            "#,
        )
        .bind(key)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(created)
    }

    async fn increment_usage(&self, key: &str) -> Result<bool, AppError> {
        // Single statement so concurrent requests for one key never lose an update
        let updated = sqlx::query(
            r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1,
                last_used = NOW()
            WHERE key = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn list_by_usage(&self) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT key, name, usage_count, last_used, is_active, created_at
            FROM api_keys
            ORDER BY usage_count DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}

/// Generate a new key: `sk_` followed by 32 lowercase hex characters.
pub fn generate_key() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// Create a key for the integrator called `name`.
///
/// # Errors
///
/// - `InvalidRequest`: name is missing, blank or too long
/// - `Internal`: every generated key collided
/// - `Database`: the registry is unavailable
pub async fn create_key(registry: &dyn KeyRegistry, name: Option<&str>) -> Result<ApiKey, AppError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }

    for _ in 0..CREATE_ATTEMPTS {
        let key = generate_key();
        if let Some(created) = registry.insert(&key, name).await? {
            tracing::info!(name = %created.name, "api key created");
            return Ok(created);
        }
        tracing::warn!("generated api key collided with an existing one, retrying");
    }

    Err(AppError::Internal(format!(
        "no unique api key after {CREATE_ATTEMPTS} attempts"
    )))
}

/// Insert the configured bootstrap keys, leaving existing ones untouched.
///
/// Returns how many keys were newly created.
pub async fn seed_keys(
    registry: &dyn KeyRegistry,
    keys: &[(String, String)],
) -> Result<usize, AppError> {
    let mut created = 0;
    for (key, name) in keys {
        if registry.insert(key, name).await?.is_some() {
            tracing::info!(%name, "bootstrap api key created");
            created += 1;
        } else {
            tracing::debug!(%name, "bootstrap api key already present");
        }
    }
    Ok(created)
}
