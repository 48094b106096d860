//! Time-limited URLs for objects on the primary provider.

use std::sync::Arc;
use std::time::Duration;

use stowage_storage::ProviderClientFactory;
use url::Url;

#[derive(Clone)]
pub struct SignedUrlResolver {
    factory: Arc<ProviderClientFactory>,
    default_ttl: Duration,
}

impl SignedUrlResolver {
    pub fn new(factory: Arc<ProviderClientFactory>, default_ttl: Duration) -> Self {
        Self {
            factory,
            default_ttl,
        }
    }

    /// Sign a GET for `path` on the primary provider.
    ///
    /// `None` when the primary is not configured or signing fails. The object
    /// does not have to exist.
    pub async fn get_signed_url(&self, path: &str, ttl: Option<Duration>) -> Option<String> {
        let client = self.factory.get_client()?;
        let key = path.trim_start_matches('/');
        let ttl = ttl.unwrap_or(self.default_ttl);

        match client.get_presigned_url(key, ttl).await {
            Ok(url) => {
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Signed URL issued");
                Some(url)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Failed to sign URL");
                None
            }
        }
    }

    /// Turn an absolute URL on the primary store into a signed one.
    ///
    /// URLs on any other host, and anything that does not parse, come back
    /// unchanged. `None` only when the URL belongs to the primary and signing fails.
    pub async fn resolve_signed_url(&self, url: &str) -> Option<String> {
        let credentials = self.factory.credentials();

        let Some(endpoint_host) = credentials.endpoint_host() else {
            return Some(url.to_string());
        };
        let Ok(parsed) = Url::parse(url) else {
            return Some(url.to_string());
        };
        let Some(host) = parsed.host_str().map(str::to_lowercase) else {
            return Some(url.to_string());
        };

        let bucket = credentials.bucket_name.as_str();
        let virtual_host = format!("{}.{}", bucket, endpoint_host).to_lowercase();
        if host != endpoint_host && host != virtual_host {
            return Some(url.to_string());
        }

        match object_key(&parsed, bucket) {
            Some(key) => self.get_signed_url(&key, None).await,
            None => Some(url.to_string()),
        }
    }
}

/// Key of a primary-store URL, with the query dropped and percent-escapes decoded.
fn object_key(parsed: &Url, bucket: &str) -> Option<String> {
    let path = parsed.path();
    let marker = format!("/{}/", bucket);

    let raw = match path.find(&marker) {
        Some(idx) => path[idx + marker.len()..].to_string(),
        None => {
            let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
            let segments = match segments.split_first() {
                Some((first, rest)) if *first == bucket => rest,
                _ => &segments[..],
            };
            segments.join("/")
        }
    };

    let key = urlencoding::decode(&raw).ok()?.into_owned();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
