//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Snapshot of one stored object as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    /// Key relative to the listed prefix, `/`-separated.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time reported by the backend.
    pub last_modified: DateTime<Utc>,
}

impl StorageObject {
    /// True when the key names an object directly beneath the listed prefix.
    pub fn is_top_level(&self) -> bool {
        !self.key.contains('/')
    }
}

/// Flat blob store the chart repository is published from.
///
/// Keys are `/`-separated relative paths. A prefix of `""` addresses the whole store.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// List every object beneath `prefix`, with keys made relative to it.
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StorageObject>>;

    /// Fetch an object's content.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    /// Store an object, replacing any existing content.
    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()>;

    /// Remove an object. Missing objects yield [`StorageError::NotFound`].
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Static backend identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// Check whether an object exists.
    async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        match self.get_object(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Join a repository prefix and a key into a full storage key.
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Reject keys that could escape the store or address nothing.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.contains('\0') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "contains forbidden characters: {key}"
        )));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "absolute keys not allowed: {key}"
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path segment: {key}"
        )));
    }
    Ok(())
}
