//! In-memory collaborators for gateway tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stowage_core::models::{ObjectInfo, StoredObjectRecord};
use stowage_core::{Credentials, MetadataRecorder, ProfileStore, RecordError, StorageBackend};
use stowage_gateway::{StorageGateway, StorageGatewayContext};
use stowage_storage::{ProviderClientFactory, Storage, StorageError, StorageResult};
use uuid::Uuid;

pub const PRIMARY_ENDPOINT: &str = "https://s3.us-west-004.backblazeb2.com";
pub const BUCKET: &str = "resources";
pub const SECONDARY_BASE: &str = "https://project.example.co/storage/v1/object/public/resources";

pub struct MemoryStorage {
    backend: StorageBackend,
    base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    pub fail_puts: AtomicBool,
    pub fail_authorize: AtomicBool,
    pub authorize_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    authorize_delay: Duration,
    put_delay: Duration,
}

impl MemoryStorage {
    pub fn new(backend: StorageBackend, base_url: &str) -> Self {
        Self {
            backend,
            base_url: base_url.to_string(),
            objects: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_authorize: AtomicBool::new(false),
            authorize_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            authorize_delay: Duration::ZERO,
            put_delay: Duration::ZERO,
        }
    }

    pub fn primary() -> Self {
        Self::new(StorageBackend::S3, &format!("{}/{}", PRIMARY_ENDPOINT, BUCKET))
    }

    pub fn secondary() -> Self {
        Self::new(StorageBackend::Managed, SECONDARY_BASE)
    }

    pub fn failing_puts(self) -> Self {
        self.fail_puts.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_authorize(self) -> Self {
        self.fail_authorize.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_authorize_delay(mut self, delay: Duration) -> Self {
        self.authorize_delay = delay;
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn insert(&self, key: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(data));
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn authorize(&self) -> StorageResult<()> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if !self.authorize_delay.is_zero() {
            tokio::time::sleep(self.authorize_delay).await;
        }
        if self.fail_authorize.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("403 Forbidden".to_string()));
        }
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
        _metadata: &HashMap<String, String>,
    ) -> StorageResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("connection reset".to_string()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(self.public_url(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects: Vec<ObjectInfo> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectInfo {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: None,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects.truncate(max_keys);
        Ok(objects)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.contains(key))
    }

    async fn get_presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "{}?X-Amz-Expires={}&X-Amz-Signature=test",
            self.public_url(key),
            expires_in.as_secs()
        ))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    pub records: Mutex<Vec<StoredObjectRecord>>,
    pub forgotten: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingRecorder {
    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.fail.store(true, Ordering::SeqCst);
        recorder
    }

    pub fn records(&self) -> Vec<StoredObjectRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataRecorder for RecordingRecorder {
    async fn record(&self, record: &StoredObjectRecord) -> Result<(), RecordError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RecordError::Unavailable("connection refused".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn forget(&self, storage_path: &str) -> Result<u64, RecordError> {
        self.forgotten.lock().unwrap().push(storage_path.to_string());
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.storage_path != storage_path);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct RecordingProfiles {
    pub updates: Mutex<Vec<(Uuid, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ProfileStore for RecordingProfiles {
    async fn update_avatar(&self, user_id: Uuid, avatar_url: &str) -> Result<(), RecordError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RecordError::ProfileNotFound(user_id));
        }
        self.updates
            .lock()
            .unwrap()
            .push((user_id, avatar_url.to_string()));
        Ok(())
    }
}

pub fn configured_credentials() -> Credentials {
    Credentials::new("key-id", "secret", BUCKET, PRIMARY_ENDPOINT, "")
}

pub struct Harness {
    pub gateway: Arc<StorageGateway>,
    pub primary: Arc<MemoryStorage>,
    pub secondary: Arc<MemoryStorage>,
    pub recorder: Arc<RecordingRecorder>,
    pub profiles: Arc<RecordingProfiles>,
    pub builds: Arc<AtomicUsize>,
}

pub fn harness_with(
    credentials: Credentials,
    primary: MemoryStorage,
    secondary: MemoryStorage,
    recorder: RecordingRecorder,
) -> Harness {
    let primary = Arc::new(primary);
    let secondary = Arc::new(secondary);
    let recorder = Arc::new(recorder);
    let profiles = Arc::new(RecordingProfiles::default());
    let builds = Arc::new(AtomicUsize::new(0));

    let client = Arc::clone(&primary);
    let build_count = Arc::clone(&builds);
    let factory = ProviderClientFactory::with_builder(
        credentials,
        Box::new(move |_| {
            build_count.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&client) as Arc<dyn Storage>)
        }),
    );

    let ctx = StorageGatewayContext::new(
        Arc::new(factory),
        Arc::clone(&secondary) as Arc<dyn Storage>,
        Duration::from_secs(3600),
    )
    .with_recorder(Arc::clone(&recorder) as Arc<dyn MetadataRecorder>)
    .with_profiles(Arc::clone(&profiles) as Arc<dyn ProfileStore>);

    Harness {
        gateway: Arc::new(StorageGateway::new(ctx)),
        primary,
        secondary,
        recorder,
        profiles,
        builds,
    }
}

pub fn harness(primary: MemoryStorage) -> Harness {
    harness_with(
        configured_credentials(),
        primary,
        MemoryStorage::secondary(),
        RecordingRecorder::default(),
    )
}

pub fn unconfigured_harness() -> Harness {
    harness_with(
        Credentials::new("", "", "", "", ""),
        MemoryStorage::primary(),
        MemoryStorage::secondary(),
        RecordingRecorder::default(),
    )
}
