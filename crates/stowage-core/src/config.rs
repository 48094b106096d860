//! Configuration module
//!
//! Settings are looked up through a [`ConfigResolver`], which consults an ordered
//! list of [`ConfigSource`]s: values captured when the crate was built, a runtime
//! table injected at startup, and finally the process environment. The typed
//! [`GatewayConfig`] is resolved once at startup and handed to the components
//! that need it; nothing downstream reads the environment again.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::constants::{
    DEFAULT_BUCKET, DEFAULT_LOCAL_STORAGE_BASE_URL, DEFAULT_LOCAL_STORAGE_PATH, DEFAULT_REGION,
    DEFAULT_SIGNED_URL_TTL_SECS, RUNTIME_CONFIG_ENV,
};
use crate::storage_types::StorageBackend;

const DB_MAX_CONNECTIONS: u32 = 5;

/// Recognized configuration keys.
pub mod keys {
    pub const ACCESS_KEY_ID: &str = "STORAGE_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "STORAGE_SECRET_ACCESS_KEY";
    pub const BUCKET: &str = "STORAGE_BUCKET";
    pub const ENDPOINT: &str = "STORAGE_ENDPOINT";
    pub const REGION: &str = "STORAGE_REGION";
    pub const MANAGED_STORAGE_URL: &str = "MANAGED_STORAGE_URL";
    pub const MANAGED_STORAGE_KEY: &str = "MANAGED_STORAGE_KEY";
    pub const MANAGED_STORAGE_BUCKET: &str = "MANAGED_STORAGE_BUCKET";
    pub const LOCAL_STORAGE_PATH: &str = "LOCAL_STORAGE_PATH";
    pub const LOCAL_STORAGE_BASE_URL: &str = "LOCAL_STORAGE_BASE_URL";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";
    pub const SIGNED_URL_TTL_SECS: &str = "SIGNED_URL_TTL_SECS";
}

/// A place configuration values can come from.
pub trait ConfigSource: Send + Sync {
    /// Short label used in diagnostics.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<String>;
}

/// Values baked into the binary with `option_env!` at compile time.
#[derive(Debug, Clone, Default)]
pub struct BuildTimeSource {
    values: HashMap<&'static str, &'static str>,
}

macro_rules! capture_build_env {
    ($values:ident, $($key:literal),+ $(,)?) => {
        $(
            if let Some(value) = option_env!($key) {
                $values.insert($key, value);
            }
        )+
    };
}

impl BuildTimeSource {
    /// Snapshot of the recognized keys as they were set for the compiler.
    pub fn captured() -> Self {
        let mut values = HashMap::new();
        capture_build_env!(
            values,
            "STORAGE_ACCESS_KEY_ID",
            "STORAGE_SECRET_ACCESS_KEY",
            "STORAGE_BUCKET",
            "STORAGE_ENDPOINT",
            "STORAGE_REGION",
            "MANAGED_STORAGE_URL",
            "MANAGED_STORAGE_KEY",
            "MANAGED_STORAGE_BUCKET",
        );
        Self { values }
    }

    pub fn from_pairs(pairs: &[(&'static str, &'static str)]) -> Self {
        Self {
            values: pairs.iter().copied().collect(),
        }
    }
}

impl ConfigSource for BuildTimeSource {
    fn name(&self) -> &'static str {
        "build"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.to_string())
    }
}

/// Table injected by the host process at startup.
#[derive(Debug, Clone, Default)]
pub struct RuntimeTable {
    values: HashMap<String, String>,
}

impl RuntimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Load a `KEY=VALUE` file (dotenv syntax) without touching the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to open runtime config {}", path.display()))?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item
                .with_context(|| format!("Invalid line in runtime config {}", path.display()))?;
            values.insert(key, value);
        }
        Ok(Self { values })
    }
}

impl FromIterator<(String, String)> for RuntimeTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl ConfigSource for RuntimeTable {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// The process environment, consulted last.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn name(&self) -> &'static str {
        "process"
    }

    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Resolves a key against the configured sources in precedence order.
pub struct ConfigResolver {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigResolver {
    pub fn new(sources: Vec<Box<dyn ConfigSource>>) -> Self {
        Self { sources }
    }

    /// Build-time values, then `runtime`, then the process environment.
    pub fn standard(runtime: RuntimeTable) -> Self {
        Self::new(vec![
            Box::new(BuildTimeSource::captured()),
            Box::new(runtime),
            Box::new(ProcessEnv),
        ])
    }

    /// Load `.env`, pick up the runtime table named by `STOWAGE_RUNTIME_CONFIG`,
    /// and return the standard resolver.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let runtime = match env::var(RUNTIME_CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => RuntimeTable::from_file(path.trim())
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, path = %path, "Ignoring unreadable runtime config");
                    RuntimeTable::default()
                }),
            _ => RuntimeTable::default(),
        };

        Self::standard(runtime)
    }

    /// First non-empty value for `key`, or an empty string.
    ///
    /// Only the name of the satisfying source is logged, never the value.
    pub fn resolve(&self, key: &str) -> String {
        for source in &self.sources {
            if let Some(value) = source.get(key) {
                let value = value.trim();
                if !value.is_empty() {
                    tracing::debug!(key, source = source.name(), found = true, "Config key resolved");
                    return value.to_string();
                }
            }
        }

        tracing::debug!(key, found = false, "Config key not set");
        String::new()
    }

    pub fn resolve_opt(&self, key: &str) -> Option<String> {
        let value = self.resolve(key);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn resolve_or(&self, key: &str, default: &str) -> String {
        self.resolve_opt(key).unwrap_or_else(|| default.to_string())
    }

    pub fn resolve_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.resolve_opt(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::standard(RuntimeTable::default())
    }
}

/// Credentials for the primary, S3-compatible provider.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub endpoint: String,
    pub region: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field(
                "secret_key",
                &if self.secret_key.is_empty() {
                    "<empty>"
                } else {
                    "<redacted>"
                },
            )
            .field("bucket_name", &self.bucket_name)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

impl Credentials {
    /// Build credentials, filling in the bucket, endpoint scheme and region.
    pub fn new(
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        bucket_name: impl Into<String>,
        endpoint: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let bucket_name = bucket_name.into().trim().to_string();
        let endpoint = endpoint.into().trim().to_string();
        let region = region.into().trim().to_string();

        let (endpoint, region) = if endpoint.is_empty() {
            let region = if region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                region
            };
            (format!("https://s3.{}.amazonaws.com", region), region)
        } else {
            let endpoint = normalize_endpoint(&endpoint);
            let region = if region.is_empty() {
                derive_region(&endpoint).unwrap_or_else(|| DEFAULT_REGION.to_string())
            } else {
                region
            };
            (endpoint, region)
        };

        Self {
            key_id: key_id.into().trim().to_string(),
            secret_key: secret_key.into().trim().to_string(),
            bucket_name: if bucket_name.is_empty() {
                DEFAULT_BUCKET.to_string()
            } else {
                bucket_name
            },
            endpoint,
            region,
        }
    }

    pub fn resolve(resolver: &ConfigResolver) -> Self {
        Self::new(
            resolver.resolve(keys::ACCESS_KEY_ID),
            resolver.resolve(keys::SECRET_ACCESS_KEY),
            resolver.resolve(keys::BUCKET),
            resolver.resolve(keys::ENDPOINT),
            resolver.resolve(keys::REGION),
        )
    }

    /// Both halves of the key pair are present.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.secret_key.is_empty()
    }

    pub fn endpoint_host(&self) -> Option<String> {
        url::Url::parse(&self.endpoint)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}

/// Prefix a scheme when missing and drop trailing slashes.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Region embedded in endpoints shaped like `s3.<region>.<domain>`.
pub fn derive_region(endpoint: &str) -> Option<String> {
    let parsed = url::Url::parse(&normalize_endpoint(endpoint)).ok()?;
    let host = parsed.host_str()?;
    let mut labels = host.split('.');
    match (labels.next(), labels.next(), labels.next()) {
        (Some("s3"), Some(region), Some(_)) if !region.is_empty() => Some(region.to_string()),
        _ => None,
    }
}

/// Fallback provider settings.
#[derive(Clone, PartialEq, Eq)]
pub enum SecondaryConfig {
    /// Hosted storage service speaking the storage REST protocol.
    Managed {
        base_url: String,
        service_key: String,
        bucket: String,
    },
    /// Local filesystem; needs no configuration at all.
    Local { path: String, base_url: String },
}

impl fmt::Debug for SecondaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondaryConfig::Managed {
                base_url, bucket, ..
            } => f
                .debug_struct("Managed")
                .field("base_url", base_url)
                .field("service_key", &"<redacted>")
                .field("bucket", bucket)
                .finish(),
            SecondaryConfig::Local { path, base_url } => f
                .debug_struct("Local")
                .field("path", path)
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl SecondaryConfig {
    pub fn resolve(resolver: &ConfigResolver) -> Self {
        match resolver.resolve_opt(keys::MANAGED_STORAGE_URL) {
            Some(base_url) => SecondaryConfig::Managed {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key: resolver.resolve(keys::MANAGED_STORAGE_KEY),
                bucket: resolver.resolve_or(keys::MANAGED_STORAGE_BUCKET, DEFAULT_BUCKET),
            },
            None => SecondaryConfig::Local {
                path: resolver.resolve_or(keys::LOCAL_STORAGE_PATH, DEFAULT_LOCAL_STORAGE_PATH),
                base_url: resolver
                    .resolve_or(keys::LOCAL_STORAGE_BASE_URL, DEFAULT_LOCAL_STORAGE_BASE_URL),
            },
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            SecondaryConfig::Managed { .. } => StorageBackend::Managed,
            SecondaryConfig::Local { .. } => StorageBackend::Local,
        }
    }
}

/// Everything the gateway needs, resolved once at startup.
#[derive(Clone)]
pub struct GatewayConfig {
    pub credentials: Credentials,
    pub secondary: SecondaryConfig,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub signed_url_ttl: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("credentials", &self.credentials)
            .field("secondary", &self.secondary)
            .field("database_configured", &self.database_url.is_some())
            .field("db_max_connections", &self.db_max_connections)
            .field("signed_url_ttl", &self.signed_url_ttl)
            .finish()
    }
}

impl GatewayConfig {
    pub fn resolve(resolver: &ConfigResolver) -> Self {
        let credentials = Credentials::resolve(resolver);
        let secondary = SecondaryConfig::resolve(resolver);

        tracing::info!(
            primary_configured = credentials.is_configured(),
            bucket = %credentials.bucket_name,
            endpoint = %credentials.endpoint,
            secondary = %secondary.backend(),
            "Storage configuration resolved"
        );

        Self {
            credentials,
            secondary,
            database_url: resolver.resolve_opt(keys::DATABASE_URL),
            db_max_connections: resolver
                .resolve_parsed(keys::DB_MAX_CONNECTIONS, DB_MAX_CONNECTIONS),
            signed_url_ttl: Duration::from_secs(
                resolver.resolve_parsed(keys::SIGNED_URL_TTL_SECS, DEFAULT_SIGNED_URL_TTL_SECS),
            ),
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(&ConfigResolver::from_env())
    }
}
