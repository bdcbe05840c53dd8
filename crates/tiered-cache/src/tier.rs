//! Storage tier abstraction shared by the memory and disk stores

use crate::error::Result;
use crate::types::{CacheEntry, CacheKey, EntryMetadata};
use async_trait::async_trait;
use std::sync::Arc;

/// One layer of the cache.
///
/// Reads return `Ok(None)` for a miss. The memory tier never fails; the disk
/// tier reports I/O failures as [`crate::CacheError::StorageIo`].
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>>;

    /// Metadata only; must not read payload bytes.
    async fn get_metadata(&self, key: &CacheKey) -> Result<Option<EntryMetadata>>;

    async fn put(&self, key: &CacheKey, entry: Arc<CacheEntry>) -> Result<()>;

    async fn delete(&self, key: &CacheKey) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
