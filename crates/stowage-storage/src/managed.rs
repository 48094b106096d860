//! Managed storage service backend.
//!
//! Speaks the hosted storage REST protocol (`/storage/v1/...`) with a service
//! key. Needs nothing beyond a base URL and a key, which makes it the usual
//! fallback when the S3-compatible primary is unavailable.

use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use stowage_core::models::ObjectInfo;

const CACHE_CONTROL: &str = "max-age=3600";

#[derive(Clone)]
pub struct ManagedStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// Folders come back without an id.
    id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    metadata: Option<EntryMetadata>,
}

#[derive(Debug, Deserialize)]
struct EntryMetadata {
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_missing(status: StatusCode) -> bool {
    // The service reports missing objects as 400 with a nested 404 body on some versions.
    status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST
}

impl ManagedStorage {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_key(key)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", self.service_key.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        request
            .send()
            .await
            .map_err(|e| StorageError::BackendError(format!("Request failed: {}", e)))
    }

    async fn error_text(response: Response) -> String {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        format!("status {}: {}", status, body)
    }
}

#[async_trait]
impl Storage for ManagedStorage {
    async fn authorize(&self) -> StorageResult<()> {
        let url = format!("{}/storage/v1/bucket/{}", self.base_url, self.bucket);
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::ConfigError(format!(
                "Managed storage rejected bucket probe: {}",
                Self::error_text(response).await
            )))
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        _metadata: &HashMap<String, String>,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let request = self
            .request(Method::POST, &self.object_url(key))
            .header("content-type", content_type)
            .header("cache-control", CACHE_CONTROL)
            .header("x-upsert", "true")
            .body(data);

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let message = Self::error_text(response).await;
            tracing::error!(
                error = %message,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Managed storage upload failed"
            );
            return Err(StorageError::UploadFailed(message));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Managed storage upload successful"
        );

        Ok(self.public_url(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let start = std::time::Instant::now();

        let response = self
            .send(self.request(Method::GET, &self.object_url(key)))
            .await?;

        let status = response.status();
        if is_missing(status) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::DownloadFailed(
                Self::error_text(response).await,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Managed storage download successful"
        );

        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);

        let response = self
            .send(
                self.request(Method::DELETE, &url)
                    .json(&json!({ "prefixes": [key] })),
            )
            .await?;

        if !response.status().is_success() {
            let message = Self::error_text(response).await;
            tracing::error!(
                error = %message,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Managed storage delete failed"
            );
            return Err(StorageError::DeleteFailed(message));
        }

        let removed: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if removed.is_empty() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Managed storage delete successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> StorageResult<Vec<ObjectInfo>> {
        let prefix = prefix.trim_matches('/');
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);

        let response = self
            .send(self.request(Method::POST, &url).json(&json!({
                "prefix": prefix,
                "limit": max_keys,
                "offset": 0,
            })))
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendError(
                Self::error_text(response).await,
            ));
        }

        let entries: Vec<ListEntry> = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid list response: {}", e)))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.id.is_some())
            .take(max_keys)
            .map(|entry| ObjectInfo {
                key: if prefix.is_empty() {
                    entry.name
                } else {
                    format!("{}/{}", prefix, entry.name)
                },
                size: entry.metadata.and_then(|m| m.size).unwrap_or(0),
                last_modified: entry.updated_at,
            })
            .collect())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let response = self
            .send(self.request(Method::HEAD, &self.object_url(key)))
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if is_missing(status) {
            Ok(false)
        } else {
            Err(StorageError::BackendError(format!(
                "Unexpected status {} for HEAD {}",
                status, key
            )))
        }
    }

    async fn get_presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url,
            self.bucket,
            encode_key(key)
        );

        let response = self
            .send(
                self.request(Method::POST, &url)
                    .json(&json!({ "expiresIn": expires_in.as_secs() })),
            )
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendError(
                Self::error_text(response).await,
            ));
        }

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid sign response: {}", e)))?;

        if signed.signed_url.starts_with("http://") || signed.signed_url.starts_with("https://") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_key(key)
        )
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Managed
    }
}
