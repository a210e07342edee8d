//! In-memory storage backend.
//!
//! Useful for tests and throwaway servers; contents vanish with the process.

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_key, StorageBackend, StorageObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    last_modified: DateTime<Utc>,
}

/// Object store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time.
    pub async fn put_object_at(
        &self,
        key: &str,
        content: Bytes,
        last_modified: DateTime<Utc>,
    ) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                content,
                last_modified,
            },
        );
        Ok(())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StorageObject>> {
        let prefix = prefix.trim_matches('/');
        let dir = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        let objects = self.objects.read().await;
        Ok(objects
            .range(dir.clone()..)
            .take_while(|(key, _)| key.starts_with(&dir))
            .map(|(key, stored)| StorageObject {
                key: key[dir.len()..].to_string(),
                size: stored.content.len() as u64,
                last_modified: stored.last_modified,
            })
            .collect())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|stored| stored.content.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()> {
        self.put_object_at(key, content, Utc::now()).await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_scoped_to_prefix_directory() {
        let store = MemoryBackend::new();
        store
            .put_object("a-0.1.0.tgz", Bytes::from_static(b"root"))
            .await
            .unwrap();
        store
            .put_object("org/b-0.1.0.tgz", Bytes::from_static(b"org"))
            .await
            .unwrap();
        store
            .put_object("orgx/c-0.1.0.tgz", Bytes::from_static(b"other"))
            .await
            .unwrap();

        let keys: Vec<String> = store
            .list_objects("org")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["b-0.1.0.tgz"]);

        let all = store.list_objects("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemoryBackend::new();
        let err = store.delete_object("nope.tgz").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
