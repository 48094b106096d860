//! Collaborators injected into the gateway.

use std::sync::Arc;
use std::time::Duration;

use stowage_core::{MetadataRecorder, NoOpMetadataRecorder, NoOpProfileStore, ProfileStore};
use stowage_storage::{ProviderClientFactory, Storage};

/// Everything the gateway depends on, built once at startup.
#[derive(Clone)]
pub struct StorageGatewayContext {
    pub factory: Arc<ProviderClientFactory>,
    pub secondary: Arc<dyn Storage>,
    pub recorder: Arc<dyn MetadataRecorder>,
    pub profiles: Arc<dyn ProfileStore>,
    pub signed_url_ttl: Duration,
}

impl StorageGatewayContext {
    /// Context without a metadata store: records and avatar updates are dropped.
    pub fn new(
        factory: Arc<ProviderClientFactory>,
        secondary: Arc<dyn Storage>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            factory,
            secondary,
            recorder: Arc::new(NoOpMetadataRecorder),
            profiles: Arc::new(NoOpProfileStore),
            signed_url_ttl,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn MetadataRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = profiles;
        self
    }
}
