//! In-memory storage backend.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use crate::{CacheEntry, CacheError, CacheStorage, RequestKey};

/// In-memory [`CacheStorage`] backend.
///
/// The backing map lives behind a single `RwLock`; each operation holds the
/// lock only for the duration of that operation, which is all the
/// concurrency story the controller requires of a storage medium.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, HashMap<RequestKey, CacheEntry>>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a bucket, if it exists.
    pub async fn entry_count(&self, bucket: &str) -> Option<usize> {
        self.buckets.read().await.get(bucket).map(|b| b.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), CacheError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, bucket: &str) -> Result<bool, CacheError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn put(
        &self,
        bucket: &str,
        key: RequestKey,
        entry: CacheEntry,
    ) -> Result<(), CacheError> {
        let mut buckets = self.buckets.write().await;
        let entries = buckets
            .get_mut(bucket)
            .ok_or_else(|| CacheError::BucketMissing(bucket.to_string()))?;
        entries.insert(key, entry);
        Ok(())
    }

    async fn match_entry(
        &self,
        bucket: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }

    async fn names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }
}
