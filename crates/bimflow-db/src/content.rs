use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use bimflow_core::models::{ContentRecord, NewContentRecord};
use bimflow_core::AppError;

/// Index of content-addressed blobs, keyed by `contentId`.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, AppError>;

    /// Insert a record unless one exists for the same `contentId`.
    ///
    /// Returns the stored record and whether this call created it. When two
    /// callers race, exactly one sees `true`.
    async fn insert_if_absent(
        &self,
        record: NewContentRecord,
    ) -> Result<(ContentRecord, bool), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    #[tracing::instrument(skip(self))]
    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, ContentRecord>(
            r#"
            SELECT content_id, original_name, size, content_type, storage_key, created_at
            FROM content_records
            WHERE content_id = $1
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, record), fields(content_id = %record.content_id))]
    async fn insert_if_absent(
        &self,
        record: NewContentRecord,
    ) -> Result<(ContentRecord, bool), AppError> {
        let inserted = sqlx::query_as::<Postgres, ContentRecord>(
            r#"
            INSERT INTO content_records (content_id, original_name, size, content_type, storage_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (content_id) DO NOTHING
            RETURNING content_id, original_name, size, content_type, storage_key, created_at
            "#,
        )
        .bind(&record.content_id)
        .bind(&record.original_name)
        .bind(record.size)
        .bind(&record.content_type)
        .bind(&record.storage_key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            tracing::info!(
                content_id = %created.content_id,
                size_bytes = created.size,
                "Content record created"
            );
            return Ok((created, true));
        }

        let existing = self.get(&record.content_id).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "Content record {} conflicted but could not be read back",
                record.content_id
            ))
        })?;
        Ok((existing, false))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
