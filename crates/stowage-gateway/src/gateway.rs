//! Storage gateway: provider selection, fallback and background metadata.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use sha2::{Digest, Sha256};
use stowage_core::constants::{DEFAULT_CONTENT_TYPE, DEFAULT_FOLDER, DEFAULT_LIST_MAX_KEYS};
use stowage_core::models::{
    GatewayStats, ObjectInfo, ProviderStatus, StoredObjectRecord, UploadOptions, UploadRequest,
    UploadResult,
};
use stowage_core::{Provider, StorageBackend};
use stowage_storage::keys::{avatar_folder, generate_storage_key, validate_key};
use stowage_storage::{ProviderClientFactory, Storage};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::context::StorageGatewayContext;
use crate::signing::SignedUrlResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    NotInitialized,
    Initializing,
    Ready,
}

/// The authorization probe, shared by every caller that waits on it.
type ProbeFuture = Shared<BoxFuture<'static, bool>>;

#[derive(Default)]
struct Counters {
    primary_failures: AtomicU64,
    consecutive_primary_failures: AtomicU64,
    fallback_uploads: AtomicU64,
    failed_uploads: AtomicU64,
    metadata_failures: AtomicU64,
    metadata_writes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            primary_failures: self.primary_failures.load(Ordering::Relaxed),
            consecutive_primary_failures: self.consecutive_primary_failures.load(Ordering::Relaxed),
            fallback_uploads: self.fallback_uploads.load(Ordering::Relaxed),
            failed_uploads: self.failed_uploads.load(Ordering::Relaxed),
            metadata_failures: self.metadata_failures.load(Ordering::Relaxed),
            metadata_writes: self.metadata_writes.load(Ordering::Relaxed),
        }
    }
}

/// Facade over the primary and secondary providers.
///
/// Create one per process and share it (`Arc<StorageGateway>`); all methods
/// take `&self`.
pub struct StorageGateway {
    ctx: StorageGatewayContext,
    signer: SignedUrlResolver,
    /// Sticky provider flag: `true` when the primary passed authorization.
    /// Written once, by the probe task.
    use_primary: Arc<OnceLock<bool>>,
    probe: OnceLock<ProbeFuture>,
    counters: Arc<Counters>,
    tasks: TaskTracker,
}

impl StorageGateway {
    pub fn new(ctx: StorageGatewayContext) -> Self {
        let signer = SignedUrlResolver::new(Arc::clone(&ctx.factory), ctx.signed_url_ttl);
        Self {
            ctx,
            signer,
            use_primary: Arc::new(OnceLock::new()),
            probe: OnceLock::new(),
            counters: Arc::new(Counters::default()),
            tasks: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> GatewayState {
        if self.use_primary.get().is_some() {
            GatewayState::Ready
        } else if self.probe.get().is_some() {
            GatewayState::Initializing
        } else {
            GatewayState::NotInitialized
        }
    }

    /// Decide, once, whether the primary provider is usable.
    ///
    /// The probe runs in its own task and every caller awaits a shared handle
    /// to it, so the primary sees exactly one authorization request even when
    /// the caller that started it is cancelled. Returns the sticky flag.
    pub async fn initialize(&self) -> bool {
        if let Some(use_primary) = self.use_primary.get() {
            return *use_primary;
        }

        let probe = self.probe.get_or_init(|| {
            let factory = Arc::clone(&self.ctx.factory);
            let secondary = self.ctx.secondary.backend_type();
            let decided = Arc::clone(&self.use_primary);

            let task = tokio::spawn({
                let decided = Arc::clone(&decided);
                async move {
                    let use_primary = probe_primary(&factory, secondary).await;
                    *decided.get_or_init(|| use_primary)
                }
            });

            async move {
                match task.await {
                    Ok(use_primary) => use_primary,
                    Err(e) => {
                        tracing::error!(error = %e, "Primary storage probe aborted, using secondary provider");
                        *decided.get_or_init(|| false)
                    }
                }
            }
            .boxed()
            .shared()
        });

        probe.clone().await
    }

    /// Providers in the order they should be tried.
    async fn providers(&self) -> Vec<(Provider, Arc<dyn Storage>)> {
        let use_primary = self.initialize().await;
        let primary = self.ctx.factory.get_client();
        let secondary = Arc::clone(&self.ctx.secondary);

        match (use_primary, primary) {
            (true, Some(primary)) => vec![
                (Provider::Primary, primary),
                (Provider::Secondary, secondary),
            ],
            (false, Some(primary)) => vec![
                (Provider::Secondary, secondary),
                (Provider::Primary, primary),
            ],
            (_, None) => vec![(Provider::Secondary, secondary)],
        }
    }

    async fn preferred(&self) -> (Provider, Arc<dyn Storage>) {
        match self.providers().await.into_iter().next() {
            Some(first) => first,
            None => (Provider::Secondary, Arc::clone(&self.ctx.secondary)),
        }
    }

    /// Run `fut` unless `cancel` fires first; the losing future is dropped.
    async fn cancellable<T>(
        cancel: &CancellationToken,
        fut: impl Future<Output = T>,
    ) -> Option<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Primary put when the sticky flag allows it, secondary otherwise or on failure.
    async fn put_with_fallback(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(Provider, String), String> {
        if self.initialize().await {
            if let Some(primary) = self.ctx.factory.get_client() {
                match primary.put(path, data.clone(), content_type, metadata).await {
                    Ok(url) => {
                        self.counters
                            .consecutive_primary_failures
                            .store(0, Ordering::Relaxed);
                        return Ok((Provider::Primary, url));
                    }
                    Err(e) => {
                        self.counters.primary_failures.fetch_add(1, Ordering::Relaxed);
                        let consecutive = self
                            .counters
                            .consecutive_primary_failures
                            .fetch_add(1, Ordering::Relaxed)
                            + 1;
                        tracing::warn!(
                            error = %e,
                            key = %path,
                            consecutive_failures = consecutive,
                            "Primary upload failed, falling back to secondary"
                        );
                    }
                }
            }
        }

        match self.ctx.secondary.put(path, data, content_type, metadata).await {
            Ok(url) => {
                self.counters.fallback_uploads.fetch_add(1, Ordering::Relaxed);
                Ok((Provider::Secondary, url))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Store `data` at an explicit `path`. No metadata record is written.
    pub async fn upload_data(
        &self,
        data: Bytes,
        path: &str,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
        let size = data.len() as u64;

        if let Some(failure) = self.validate(path, size) {
            return failure;
        }

        let outcome = Self::cancellable(
            cancel,
            self.put_with_fallback(path, data, &content_type, &HashMap::new()),
        )
        .await;

        match outcome {
            None => {
                tracing::info!(key = %path, "Upload cancelled");
                UploadResult::cancelled()
            }
            Some(Ok((provider, url))) => {
                UploadResult::stored(provider, url, path.to_string(), size, content_type)
            }
            Some(Err(e)) => self.all_providers_failed(path, e),
        }
    }

    /// Upload under a generated `<folder>/<millis>-<suffix>-<name>` path and
    /// record its metadata in the background.
    pub async fn upload(
        &self,
        request: UploadRequest,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let path = generate_storage_key(&request.folder, &request.file_name);
        let size = request.size();

        if let Some(failure) = self.validate(&path, size) {
            return failure;
        }

        let outcome = Self::cancellable(
            cancel,
            self.put_with_fallback(
                &path,
                request.data.clone(),
                &request.content_type,
                &options.metadata,
            ),
        )
        .await;

        match outcome {
            None => {
                tracing::info!(key = %path, "Upload cancelled");
                UploadResult::cancelled()
            }
            Some(Ok((provider, url))) => {
                tracing::info!(
                    key = %path,
                    provider = %provider,
                    size_bytes = size,
                    "Upload stored"
                );
                self.spawn_record(&request, options, provider, &path, &url);
                UploadResult::stored(provider, url, path, size, request.content_type)
            }
            Some(Err(e)) => self.all_providers_failed(&path, e),
        }
    }

    /// Upload into the request's folder, or `resources` when it names none.
    pub async fn upload_auto(
        &self,
        request: UploadRequest,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let request = if request.folder.is_empty() {
            request.with_folder(DEFAULT_FOLDER)
        } else {
            request
        };
        self.upload(request, options, cancel).await
    }

    /// Store a profile picture under `avatars/<user_id>/` and point the profile at it.
    ///
    /// The profile update is not transactional with the upload: if it fails the
    /// object stays in storage, the failure is logged and the upload still
    /// reports success.
    pub async fn upload_avatar(
        &self,
        request: UploadRequest,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let request = request.with_folder(avatar_folder(user_id));
        let options = UploadOptions {
            title: Some(format!("Avatar for {}", user_id)),
            uploader_id: Some(user_id),
            ..Default::default()
        };

        let result = self.upload(request, options, cancel).await;

        if let (true, Some(url)) = (result.success, result.url.as_deref()) {
            if let Err(e) = self.ctx.profiles.update_avatar(user_id, url).await {
                tracing::error!(
                    error = %e,
                    user_id = %user_id,
                    key = ?result.path,
                    "Avatar stored but profile update failed; object left orphaned"
                );
            }
        }

        result
    }

    /// Delete `path` from every provider that holds it, preferred provider first.
    ///
    /// `false` when no provider had the object or every delete failed.
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> bool {
        if validate_key(path).is_err() {
            return false;
        }

        let attempt = async {
            let mut deleted = false;
            for (provider, store) in self.providers().await {
                match store.exists(path).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %path, provider = %provider, "Existence check failed");
                        continue;
                    }
                }

                match store.delete(path).await {
                    Ok(()) => {
                        tracing::info!(key = %path, provider = %provider, "Object deleted");
                        deleted = true;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, key = %path, provider = %provider, "Delete failed");
                    }
                }
            }
            deleted
        };

        match Self::cancellable(cancel, attempt).await {
            None => {
                tracing::info!(key = %path, "Delete cancelled");
                false
            }
            Some(true) => {
                self.spawn_forget(path);
                true
            }
            Some(false) => false,
        }
    }

    /// Objects under `prefix` on the preferred provider; empty on error.
    pub async fn list(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
        cancel: &CancellationToken,
    ) -> Vec<ObjectInfo> {
        let max_keys = max_keys.unwrap_or(DEFAULT_LIST_MAX_KEYS);
        let attempt = async {
            let (provider, store) = self.preferred().await;
            store.list(prefix, max_keys).await.map_err(|e| (provider, e))
        };

        match Self::cancellable(cancel, attempt).await {
            Some(Ok(objects)) => objects,
            Some(Err((provider, e))) => {
                tracing::warn!(error = %e, prefix = %prefix, provider = %provider, "List failed");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub async fn exists(&self, path: &str, cancel: &CancellationToken) -> bool {
        if validate_key(path).is_err() {
            return false;
        }

        let attempt = async {
            for (provider, store) in self.providers().await {
                match store.exists(path).await {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, key = %path, provider = %provider, "Existence check failed");
                    }
                }
            }
            false
        };

        Self::cancellable(cancel, attempt).await.unwrap_or(false)
    }

    /// Object bytes from the first provider that has them.
    pub async fn download(&self, path: &str, cancel: &CancellationToken) -> Option<Bytes> {
        validate_key(path).ok()?;

        let attempt = async {
            for (provider, store) in self.providers().await {
                match store.download(path).await {
                    Ok(bytes) => return Some(bytes),
                    Err(e) => {
                        tracing::debug!(error = %e, key = %path, provider = %provider, "Download miss");
                    }
                }
            }
            None
        };

        Self::cancellable(cancel, attempt).await.flatten()
    }

    /// Unsigned URL of `path` on the preferred provider.
    pub async fn public_url(&self, path: &str) -> String {
        let (_, store) = self.preferred().await;
        store.public_url(path.trim_start_matches('/'))
    }

    pub async fn get_signed_url(&self, path: &str, ttl: Option<Duration>) -> Option<String> {
        self.signer.get_signed_url(path, ttl).await
    }

    pub async fn resolve_signed_url(&self, url: &str) -> Option<String> {
        self.signer.resolve_signed_url(url).await
    }

    pub fn provider_status(&self) -> ProviderStatus {
        let decided = self.use_primary.get().copied();
        ProviderStatus {
            primary_configured: self.ctx.factory.is_configured(),
            primary_ready: decided == Some(true),
            secondary_available: true,
            secondary_backend: self.ctx.secondary.backend_type(),
            preferred: decided.map(|use_primary| {
                if use_primary {
                    Provider::Primary
                } else {
                    Provider::Secondary
                }
            }),
        }
    }

    pub fn stats(&self) -> GatewayStats {
        self.counters.snapshot()
    }

    /// Wait for every background metadata write spawned so far.
    pub async fn drain_metadata(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn validate(&self, path: &str, size: u64) -> Option<UploadResult> {
        let message = if size == 0 {
            "File is empty".to_string()
        } else {
            match validate_key(path) {
                Ok(()) => return None,
                Err(e) => e.to_string(),
            }
        };

        tracing::warn!(key = %path, error = %message, "Upload rejected");
        self.counters.failed_uploads.fetch_add(1, Ordering::Relaxed);
        Some(UploadResult::failed(message))
    }

    fn all_providers_failed(&self, path: &str, error: String) -> UploadResult {
        self.counters.failed_uploads.fetch_add(1, Ordering::Relaxed);
        tracing::error!(key = %path, error = %error, "Upload failed on every provider");
        UploadResult::failed(error)
    }

    fn spawn_record(
        &self,
        request: &UploadRequest,
        options: UploadOptions,
        provider: Provider,
        path: &str,
        url: &str,
    ) {
        let record = build_record(request, options, provider, path, url);
        let recorder = Arc::clone(&self.ctx.recorder);
        let counters = Arc::clone(&self.counters);

        self.tasks.spawn(async move {
            match recorder.record(&record).await {
                Ok(()) => {
                    counters.metadata_writes.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %record.storage_path, record_id = %record.id, "Metadata recorded");
                }
                Err(e) => {
                    counters.metadata_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        key = %record.storage_path,
                        "Failed to record metadata; object is stored without a record"
                    );
                }
            }
        });
    }

    fn spawn_forget(&self, path: &str) {
        let recorder = Arc::clone(&self.ctx.recorder);
        let counters = Arc::clone(&self.counters);
        let path = path.to_string();

        self.tasks.spawn(async move {
            match recorder.forget(&path).await {
                Ok(removed) => {
                    tracing::debug!(key = %path, removed, "Metadata forgotten");
                }
                Err(e) => {
                    counters.metadata_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, key = %path, "Failed to remove metadata record");
                }
            }
        });
    }
}

async fn probe_primary(factory: &ProviderClientFactory, secondary: StorageBackend) -> bool {
    let Some(primary) = factory.get_client() else {
        tracing::info!(
            secondary = %secondary,
            "Primary storage not configured, using secondary provider"
        );
        return false;
    };

    let start = std::time::Instant::now();
    match primary.authorize().await {
        Ok(()) => {
            tracing::info!(
                bucket = %factory.credentials().bucket_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Primary storage ready"
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                secondary = %secondary,
                "Primary storage authorization failed, using secondary provider"
            );
            false
        }
    }
}

fn build_record(
    request: &UploadRequest,
    options: UploadOptions,
    provider: Provider,
    path: &str,
    url: &str,
) -> StoredObjectRecord {
    let mut metadata = options.metadata;
    metadata.insert("provider".to_string(), provider.as_str().to_string());
    metadata.insert(
        "contentSha256".to_string(),
        hex::encode(Sha256::digest(&request.data)),
    );

    StoredObjectRecord {
        id: Uuid::new_v4(),
        title: options
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| request.file_name.clone()),
        description: options.description,
        file_name: request.file_name.clone(),
        file_size: request.size(),
        mime_type: request.content_type.clone(),
        provider,
        storage_path: path.to_string(),
        storage_url: url.to_string(),
        thumbnail_url: options.thumbnail_url,
        extracted_text: options.extracted_text,
        metadata,
        uploader_id: options.uploader_id,
        created_at: Utc::now(),
    }
}
