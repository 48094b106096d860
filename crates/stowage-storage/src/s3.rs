use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;
use stowage_core::models::ObjectInfo;
use stowage_core::Credentials;

/// S3-compatible storage, addressed path-style (`{endpoint}/{bucket}/{key}`)
/// so it works against providers without virtual-hosted buckets.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    endpoint: String,
}

impl S3Storage {
    /// Build a client bound to `credentials`. No network traffic happens here.
    pub fn new(credentials: &Credentials) -> StorageResult<Self> {
        if !credentials.is_configured() {
            return Err(StorageError::ConfigError(
                "STORAGE_ACCESS_KEY_ID and STORAGE_SECRET_ACCESS_KEY must both be set".to_string(),
            ));
        }

        let allow_http = credentials.endpoint.starts_with("http://");
        let store = AmazonS3Builder::new()
            .with_access_key_id(credentials.key_id.clone())
            .with_secret_access_key(credentials.secret_key.clone())
            .with_region(credentials.region.clone())
            .with_bucket_name(credentials.bucket_name.clone())
            .with_endpoint(credentials.endpoint.clone())
            .with_allow_http(allow_http)
            .with_virtual_hosted_style_request(false)
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket: credentials.bucket_name.clone(),
            endpoint: credentials.endpoint.clone(),
        })
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key)
    }

    fn put_options(content_type: &str, metadata: &HashMap<String, String>) -> PutOptions {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        for (name, value) in metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(name.clone())),
                AttributeValue::from(value.clone()),
            );
        }

        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn authorize(&self) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let mut listing = object_store::ObjectStore::list(&self.store, None);

        match listing.next().await {
            None | Some(Ok(_)) => {
                tracing::info!(
                    bucket = %self.bucket,
                    endpoint = %self.endpoint,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 authorization successful"
                );
                Ok(())
            }
            Some(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    bucket = %self.bucket,
                    endpoint = %self.endpoint,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 authorization failed"
                );
                Err(StorageError::BackendError(e.to_string()))
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let size = data.len() as u64;
        let location = Path::from(key);
        let opts = Self::put_options(content_type, metadata);

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = object_store::ObjectStore::put_opts(
            &self.store,
            &location,
            PutPayload::from(data),
            opts,
        )
        .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        let url = self.generate_url(key);

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(url)
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key);

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key);

        let result: ObjectResult<_> = self.store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> StorageResult<Vec<ObjectInfo>> {
        let start = std::time::Instant::now();
        let prefix = prefix.trim_matches('/');
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(Path::from(prefix))
        };

        let mut listing = object_store::ObjectStore::list(&self.store, prefix_path.as_ref());
        let mut objects = Vec::new();

        while objects.len() < max_keys {
            match listing.next().await {
                Some(Ok(meta)) => objects.push(ObjectInfo {
                    key: meta.location.to_string(),
                    size: meta.size,
                    last_modified: Some(meta.last_modified),
                }),
                Some(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        prefix = %prefix,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 list failed"
                    );
                    return Err(StorageError::BackendError(e.to_string()));
                }
                None => break,
            }
        }

        tracing::debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        Ok(objects)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let location = Path::from(key);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn get_presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let location = Path::from(key);
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    fn public_url(&self, key: &str) -> String {
        self.generate_url(key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
