//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use time::OffsetDateTime;

/// Shortest presign lifetime a backend will sign.
pub const MIN_PRESIGN_EXPIRY: Duration = Duration::from_secs(1);

/// Longest presign lifetime a backend will sign (7 days, the S3 ceiling).
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 3600);

/// Metadata about a stored object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// The object's key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Public URL where the object can be fetched.
    pub url: String,
    /// Last modification time, if the backend tracks one.
    pub last_modified: Option<OffsetDateTime>,
    /// Content type, if the backend tracks one.
    pub content_type: Option<String>,
}

/// Object store abstraction for uploaded media.
///
/// Backends are expected to overwrite on `put` (keys are unique by
/// construction) and to report missing objects as
/// [`StorageError::NotFound`] rather than inventing empty results.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Generate a URL a client can PUT the object to directly.
    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Store an object, replacing any existing content under the key.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Fetch metadata about an object.
    async fn info(&self, key: &str) -> StorageResult<ObjectInfo>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Short name for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and usable.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Validate a presign expiry against the allowed bounds.
pub fn validate_presign_expiry(expires_in: Duration) -> StorageResult<()> {
    if expires_in < MIN_PRESIGN_EXPIRY {
        return Err(StorageError::InvalidExpiry(format!(
            "expiry {}s below minimum {}s",
            expires_in.as_secs(),
            MIN_PRESIGN_EXPIRY.as_secs()
        )));
    }
    if expires_in > MAX_PRESIGN_EXPIRY {
        return Err(StorageError::InvalidExpiry(format!(
            "expiry {}s above maximum {}s",
            expires_in.as_secs(),
            MAX_PRESIGN_EXPIRY.as_secs()
        )));
    }
    Ok(())
}
