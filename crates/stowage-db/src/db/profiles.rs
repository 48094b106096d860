//! Profile repository: only the avatar column is ours to write.

use async_trait::async_trait;
use sqlx::PgPool;
use stowage_core::{ProfileStore, RecordError};
use uuid::Uuid;

use super::to_record_error;

#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    #[tracing::instrument(skip(self, avatar_url), fields(db.table = "profiles", db.record_id = %user_id))]
    async fn update_avatar(&self, user_id: Uuid, avatar_url: &str) -> Result<(), RecordError> {
        let result =
            sqlx::query("UPDATE profiles SET avatar_url = $1, updated_at = NOW() WHERE id = $2")
                .bind(avatar_url)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(to_record_error)?;

        if result.rows_affected() == 0 {
            return Err(RecordError::ProfileNotFound(user_id));
        }

        Ok(())
    }
}
