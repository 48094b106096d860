use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_types::Provider;

/// Metadata row describing one stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub provider: Provider,
    pub storage_path: String,
    pub storage_url: String,
    pub thumbnail_url: Option<String>,
    pub extracted_text: Option<String>,
    /// Always carries `provider` and `contentSha256` next to caller metadata.
    pub metadata: HashMap<String, String>,
    pub uploader_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
