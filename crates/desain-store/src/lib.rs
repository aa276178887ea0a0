mod local;
#[cfg(feature = "s3")]
mod s3;

pub use local::LocalStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Bucket the design attachments live in.
pub const DEFAULT_BUCKET: &str = "desain-files";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Internal(String),
}

/// A store for attachment blobs keyed by string paths.
///
/// Every stored object has a durable public URL; records reference blobs by
/// that URL, so stores must also map a URL back to its key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write (create or overwrite) an object served as `content_type`.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// Read an object. Returns `StoreError::NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Read an object, returning `None` if it does not exist.
    async fn get_opt(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete an object. No-op if absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete several objects, stopping at the first failure.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The durable public URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Inverse of [`ObjectStore::public_url`]. `None` for URLs this store did not issue.
    fn key_for_public_url(&self, url: &str) -> Option<String>;
}

// -- Key helpers --

/// Characters escaped inside a single path segment of a public URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Key for a client-authored upload: `<owner>/<timestamp>_<file name>`.
pub fn upload_key(owner_user_id: &str, timestamp_millis: i64, file_name: &str) -> String {
    let name: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{owner_user_id}/{timestamp_millis}_{name}")
}

/// Escape each `/`-separated segment of `key` for use in a URL path.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a public base URL and a key, escaping each key segment.
pub fn join_public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), encode_key(key))
}

/// Strip `base` from `url` and decode what remains into a key.
pub fn strip_public_base(base: &str, url: &str) -> Option<String> {
    let rest = url.strip_prefix(base.trim_end_matches('/'))?.strip_prefix('/')?;
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(percent_decode_str(rest).decode_utf8_lossy().to_string())
}

/// Everything in the URL path after the first segment equal to `bucket`.
pub fn key_after_bucket(url: &str, bucket: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    let pos = segments.iter().position(|s| *s == bucket)?;
    let rest = &segments[pos + 1..];
    if rest.is_empty() || rest.iter().all(|s| s.is_empty()) {
        return None;
    }
    Some(percent_decode_str(&rest.join("/")).decode_utf8_lossy().to_string())
}

/// Human-readable file name for an attachment URL.
pub fn file_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(String::from))
        })
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
        .unwrap_or_else(|| "unknown-file".to_string())
}

// -- Configuration --

/// Configuration for the object store backend.
pub struct StoreConfig {
    /// S3-compatible endpoint URL (e.g., "https://<ref>.supabase.co/storage/v1/s3").
    /// When `None`, use local filesystem.
    pub endpoint_url: Option<String>,
    /// S3 region.
    pub region: Option<String>,
    /// Bucket name. Defaults to [`DEFAULT_BUCKET`].
    pub bucket: Option<String>,
    /// Access key ID.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Local filesystem base directory (used when S3 is not configured).
    pub local_data_dir: Option<String>,
    /// Base URL public object URLs are built from.
    pub public_base_url: Option<String>,
}

impl StoreConfig {
    /// Build from environment variables.
    /// If `DESAIN_S3_ENDPOINT` (or `AWS_ENDPOINT_URL`) is set along with
    /// credentials, use S3. Otherwise, fall back to local filesystem.
    pub fn from_env() -> Self {
        Self {
            endpoint_url: std::env::var("DESAIN_S3_ENDPOINT")
                .or_else(|_| std::env::var("AWS_ENDPOINT_URL"))
                .ok(),
            region: std::env::var("DESAIN_S3_REGION")
                .or_else(|_| std::env::var("AWS_REGION"))
                .ok(),
            bucket: std::env::var("DESAIN_BUCKET").ok(),
            access_key_id: std::env::var("DESAIN_S3_ACCESS_KEY_ID")
                .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
                .ok(),
            secret_access_key: std::env::var("DESAIN_S3_SECRET_ACCESS_KEY")
                .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
                .ok(),
            local_data_dir: std::env::var("DESAIN_STORE_DIR").ok(),
            public_base_url: std::env::var("DESAIN_PUBLIC_BASE_URL").ok(),
        }
    }

    pub fn is_s3(&self) -> bool {
        self.endpoint_url.is_some()
            && self.access_key_id.is_some()
            && self.secret_access_key.is_some()
    }

    pub fn bucket_name(&self) -> &str {
        self.bucket.as_deref().unwrap_or(DEFAULT_BUCKET)
    }
}

// -- Factory --

/// Create an `ObjectStore` from configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    if config.is_s3() {
        #[cfg(feature = "s3")]
        {
            Ok(Arc::new(S3Store::new(config)?))
        }
        #[cfg(not(feature = "s3"))]
        {
            Err(StoreError::Internal(
                "S3 configuration detected but the 's3' feature is not enabled".into(),
            ))
        }
    } else {
        Ok(Arc::new(LocalStore::new(config)))
    }
}
