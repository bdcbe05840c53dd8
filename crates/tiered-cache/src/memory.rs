//! Volatile in-memory tier

use crate::error::Result;
use crate::tier::CacheTier;
use crate::types::{CacheEntry, CacheKey, EntryMetadata};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Size-bounded memory tier. Holds evictable copies of disk entries only.
pub struct MemoryStore {
    entries: Cache<String, Arc<CacheEntry>>,
}

impl MemoryStore {
    /// Create a store bounded by total payload bytes, with an optional idle expiry
    pub fn new(max_bytes: u64, time_to_idle: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|key: &String, entry: &Arc<CacheEntry>| -> u32 {
                let weight = key.len().saturating_add(entry.payload.len());
                u32::try_from(weight).unwrap_or(u32::MAX)
            });
        if let Some(idle) = time_to_idle {
            builder = builder.time_to_idle(idle);
        }

        Self {
            entries: builder.build(),
        }
    }

    /// Drop every entry. Durable data is untouched.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Entry count and weighted size after applying pending evictions
    pub async fn usage(&self) -> (u64, u64) {
        self.entries.run_pending_tasks().await;
        (self.entries.entry_count(), self.entries.weighted_size())
    }
}

#[async_trait]
impl CacheTier for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        Ok(self.entries.get(key.as_str()).await)
    }

    async fn get_metadata(&self, key: &CacheKey) -> Result<Option<EntryMetadata>> {
        Ok(self
            .entries
            .get(key.as_str())
            .await
            .map(|entry| entry.metadata.clone()))
    }

    async fn put(&self, key: &CacheKey, entry: Arc<CacheEntry>) -> Result<()> {
        self.entries.insert(key.as_str().to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.entries.invalidate(key.as_str()).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.invalidate_all();
        debug!("Memory tier cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &CacheKey, payload: &[u8]) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(key, payload.to_vec(), None, None))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new(1024 * 1024, None);
        let key = CacheKey::new("k").unwrap();

        store.put(&key, entry(&key, b"data")).await.unwrap();

        let found = store.get(&key).await.unwrap().unwrap();
        assert_eq!(found.payload, b"data");
        let meta = store.get_metadata(&key).await.unwrap().unwrap();
        assert_eq!(meta.size, 4);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = MemoryStore::new(1024 * 1024, None);
        let key = CacheKey::new("k").unwrap();

        store.put(&key, entry(&key, b"one")).await.unwrap();
        store.put(&key, entry(&key, b"two")).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap().unwrap().payload, b"two");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = MemoryStore::new(1024 * 1024, None);
        let a = CacheKey::new("a").unwrap();
        let b = CacheKey::new("b").unwrap();
        store.put(&a, entry(&a, b"1")).await.unwrap();
        store.put(&b, entry(&b, b"2")).await.unwrap();

        store.delete(&a).await.unwrap();
        assert!(store.get(&a).await.unwrap().is_none());
        assert!(store.get(&b).await.unwrap().is_some());

        store.clear().await.unwrap();
        assert!(store.get(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        // Room for roughly two 10-byte entries
        let store = MemoryStore::new(24, None);
        for name in ["k1", "k2", "k3", "k4"] {
            let key = CacheKey::new(name).unwrap();
            store.put(&key, entry(&key, b"0123456789")).await.unwrap();
        }

        let (_, size) = store.usage().await;
        assert!(size <= 24);
    }
}
