//! Collaborator traits for the metadata store and the profile table
//!
//! The gateway never talks to the database directly. It records stored objects
//! and updates avatars through these traits so the relational store can be
//! swapped out, or disabled entirely with the no-op implementations.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::StoredObjectRecord;

/// Errors raised while writing metadata. The gateway logs and counts these;
/// they never fail an upload.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("Metadata write rejected: {0}")]
    Rejected(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(Uuid),
}

/// Persists a description of every stored object.
#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn record(&self, record: &StoredObjectRecord) -> Result<(), RecordError>;

    /// Remove records pointing at `storage_path`; returns how many were removed.
    async fn forget(&self, storage_path: &str) -> Result<u64, RecordError>;
}

/// Used when no metadata store is configured.
pub struct NoOpMetadataRecorder;

#[async_trait]
impl MetadataRecorder for NoOpMetadataRecorder {
    async fn record(&self, _record: &StoredObjectRecord) -> Result<(), RecordError> {
        Ok(())
    }

    async fn forget(&self, _storage_path: &str) -> Result<u64, RecordError> {
        Ok(0)
    }
}

/// Owner of the user profile row that references an avatar URL.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn update_avatar(&self, user_id: Uuid, avatar_url: &str) -> Result<(), RecordError>;
}

pub struct NoOpProfileStore;

#[async_trait]
impl ProfileStore for NoOpProfileStore {
    async fn update_avatar(&self, _user_id: Uuid, _avatar_url: &str) -> Result<(), RecordError> {
        Ok(())
    }
}
