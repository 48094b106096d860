//! Resource file repository: metadata rows for stored objects.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use stowage_core::models::StoredObjectRecord;
use stowage_core::{MetadataRecorder, RecordError};

use super::to_record_error;

/// Repository for resource_files table.
#[derive(Clone)]
pub struct ResourceFileRepository {
    pool: PgPool,
}

impl ResourceFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "resource_files", db.record_id = %record.id))]
    pub async fn insert(&self, record: &StoredObjectRecord) -> Result<(), RecordError> {
        let file_size = i64::try_from(record.file_size)
            .map_err(|_| RecordError::Rejected(format!("file size {} out of range", record.file_size)))?;

        sqlx::query(
            r#"
            INSERT INTO resource_files (
                id, title, description, file_name, file_size, mime_type, storage_provider,
                storage_path, storage_url, thumbnail_url, extracted_text, metadata,
                uploaded_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.file_name)
        .bind(file_size)
        .bind(&record.mime_type)
        .bind(record.provider.as_str())
        .bind(&record.storage_path)
        .bind(&record.storage_url)
        .bind(&record.thumbnail_url)
        .bind(&record.extracted_text)
        .bind(Json(&record.metadata))
        .bind(record.uploader_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(to_record_error)?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "resource_files"))]
    pub async fn delete_by_path(&self, storage_path: &str) -> Result<u64, RecordError> {
        let result = sqlx::query("DELETE FROM resource_files WHERE storage_path = $1")
            .bind(storage_path)
            .execute(&self.pool)
            .await
            .map_err(to_record_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MetadataRecorder for ResourceFileRepository {
    async fn record(&self, record: &StoredObjectRecord) -> Result<(), RecordError> {
        self.insert(record).await
    }

    async fn forget(&self, storage_path: &str) -> Result<u64, RecordError> {
        self.delete_by_path(storage_path).await
    }
}
