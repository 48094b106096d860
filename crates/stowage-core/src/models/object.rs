use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_types::{Provider, StorageBackend};

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub primary_configured: bool,
    pub primary_ready: bool,
    pub secondary_available: bool,
    pub secondary_backend: StorageBackend,
    /// `None` until the gateway has been initialized.
    pub preferred: Option<Provider>,
}

/// Counters kept by the gateway since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub primary_failures: u64,
    /// Primary failures since the last successful primary put.
    pub consecutive_primary_failures: u64,
    /// Uploads that ended up on the secondary provider.
    pub fallback_uploads: u64,
    pub failed_uploads: u64,
    pub metadata_failures: u64,
    pub metadata_writes: u64,
}
