use crate::{LocalStorage, ManagedStorage, S3Storage, Storage, StorageResult};
use std::sync::{Arc, Mutex};
use stowage_core::{Credentials, SecondaryConfig};

/// Builds a primary client from credentials. Swappable so tests can count
/// builds or substitute an in-memory store.
pub type ClientBuilder = Box<dyn Fn(&Credentials) -> StorageResult<Arc<dyn Storage>> + Send + Sync>;

/// Lazily builds and memoizes the primary client for one set of credentials.
pub struct ProviderClientFactory {
    credentials: Credentials,
    builder: ClientBuilder,
    client: Mutex<Option<Arc<dyn Storage>>>,
}

impl ProviderClientFactory {
    /// Factory producing path-style [`S3Storage`] clients.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_builder(
            credentials,
            Box::new(|creds| {
                let storage = S3Storage::new(creds)?;
                Ok(Arc::new(storage) as Arc<dyn Storage>)
            }),
        )
    }

    pub fn with_builder(credentials: Credentials, builder: ClientBuilder) -> Self {
        Self {
            credentials,
            builder,
            client: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    /// The memoized client, built on first use. `None` when credentials are
    /// missing or the build fails; neither is an error for callers.
    pub fn get_client(&self) -> Option<Arc<dyn Storage>> {
        if !self.is_configured() {
            return None;
        }

        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = slot.as_ref() {
            return Some(Arc::clone(client));
        }

        match (self.builder)(&self.credentials) {
            Ok(client) => {
                tracing::debug!(
                    bucket = %self.credentials.bucket_name,
                    endpoint = %self.credentials.endpoint,
                    region = %self.credentials.region,
                    "Primary storage client created"
                );
                *slot = Some(Arc::clone(&client));
                Some(client)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    endpoint = %self.credentials.endpoint,
                    "Failed to create primary storage client"
                );
                None
            }
        }
    }

    /// Drop the memoized client; the next `get_client` rebuilds it.
    pub fn reset(&self) {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Create the fallback backend described by `config`.
pub async fn create_secondary(config: &SecondaryConfig) -> StorageResult<Arc<dyn Storage>> {
    match config {
        SecondaryConfig::Managed {
            base_url,
            service_key,
            bucket,
        } => {
            let storage = ManagedStorage::new(base_url.clone(), service_key.clone(), bucket.clone())?;
            Ok(Arc::new(storage))
        }
        SecondaryConfig::Local { path, base_url } => {
            let storage = LocalStorage::new(path.clone(), base_url.clone()).await?;
            Ok(Arc::new(storage))
        }
    }
}
