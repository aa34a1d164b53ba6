//! Usage ledger: the append-only `usage_records` collection.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        stats::{OriginCount, SourceCounts},
        usage_record::{NewUsageRecord, SourceKind, UsageRecord},
    },
};

/// Append and aggregate operations over usage records.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Insert one record, assigning its id and creation time.
    async fn append(&self, record: NewUsageRecord) -> Result<UsageRecord, AppError>;

    async fn count_all(&self) -> Result<i64, AppError>;

    /// Counts per source; sources without records count as zero.
    async fn count_by_source(&self) -> Result<SourceCounts, AppError>;

    /// `external` records grouped by origin, largest group first.
    async fn external_origins(&self) -> Result<Vec<OriginCount>, AppError>;

    /// Cheap connectivity check for health reporting.
    async fn ping(&self) -> Result<(), AppError>;
}

/// PostgreSQL implementation of [`UsageLedger`].
#[derive(Debug, Clone)]
pub struct PgUsageLedger {
    pool: DbPool,
}

impl PgUsageLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLedger for PgUsageLedger {
    async fn append(&self, record: NewUsageRecord) -> Result<UsageRecord, AppError> {
        let record = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO usage_records (
                id,
                original_artifact_ref,
                processed_artifact_ref,
                source,
                api_key,
                origin
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.original_artifact_ref)
        .bind(record.processed_artifact_ref)
        .bind(record.source.as_str())
        .bind(record.api_key)
        .bind(record.origin)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_all(&self) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn count_by_source(&self) -> Result<SourceCounts, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT source, COUNT(*) FROM usage_records GROUP BY source")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = SourceCounts::default();
        for (source, count) in rows {
            match source.parse() {
                Ok(SourceKind::Web) => counts.web = count,
                Ok(SourceKind::Mobile) => counts.mobile = count,
                Ok(SourceKind::External) => counts.external = count,
                Err(e) => tracing::warn!(error = %e, count, "skipping records with unknown source"),
            }
        }
        Ok(counts)
    }

    async fn external_origins(&self) -> Result<Vec<OriginCount>, AppError> {
        let origins = sqlx::query_as::<_, OriginCount>(
            r#"
            SELECT origin, COUNT(*) AS count
            FROM usage_records
            WHERE source = 'external'
            GROUP BY origin
            ORDER BY count DESC, origin ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(origins)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
