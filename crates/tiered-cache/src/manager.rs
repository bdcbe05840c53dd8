//! Two-tier cache manager
//!
//! Reads go to the memory tier first and fall back to disk, backfilling memory on a
//! disk hit. Writes go to disk first and only reach memory once they are durable.

use crate::cachable::Cachable;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::persistent::PersistentStore;
use crate::tier::CacheTier;
use crate::timer::RepeatingTimer;
use crate::types::{CacheEntry, CacheKey, CacheStats};
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const LOCK_STRIPES: usize = 64;

/// Tier that answered a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitTier {
    Memory,
    Disk,
}

/// Optional validity metadata for a write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub identifying_attribute: Option<String>,
}

impl StoreOptions {
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn identifying_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.identifying_attribute = Some(attribute.into());
        self
    }
}

/// A named cache with a memory tier in front of a disk namespace.
///
/// Obtain instances through [`crate::CacheRegistry`] (or [`CacheManager::instance`]);
/// there is at most one manager per name in a registry.
pub struct CacheManager {
    name: String,
    memory: Arc<MemoryStore>,
    disk: PersistentStore,
    /// Per-key ordering between writers and disk backfills, striped by key hash
    stripes: Vec<RwLock<()>>,
    reclaim_interval: Duration,
    reclaimer: Mutex<Option<RepeatingTimer>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    pub(crate) fn new(name: &str, config: &CacheConfig) -> Self {
        let disk = PersistentStore::new(&config.root_dir, name);
        info!(namespace = %name, dir = ?disk.dir(), "Cache manager created");

        Self {
            name: name.to_string(),
            memory: Arc::new(MemoryStore::new(
                config.memory_max_bytes,
                config.memory_time_to_idle,
            )),
            disk,
            stripes: (0..LOCK_STRIPES).map(|_| RwLock::new(())).collect(),
            reclaim_interval: config.reclaim_interval,
            reclaimer: Mutex::new(None),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Manager for `name` from the process-wide registry
    pub fn instance(name: &str) -> Result<Arc<CacheManager>> {
        crate::registry::CacheRegistry::global().instance(name)
    }

    /// The process-wide `"default"` manager
    pub fn default_instance() -> Arc<CacheManager> {
        crate::registry::CacheRegistry::global().default_instance()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of this manager's disk namespace
    pub fn dir(&self) -> &Path {
        self.disk.dir()
    }

    fn stripe(&self, key: &CacheKey) -> &RwLock<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % LOCK_STRIPES]
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<(Arc<CacheEntry>, HitTier)>> {
        if let Some(entry) = self.memory.get(key).await? {
            debug!(namespace = %self.name, key = %key, "Memory hit");
            return Ok(Some((entry, HitTier::Memory)));
        }

        let _guard = self.stripe(key).read().await;
        match self.disk.get(key).await {
            Ok(Some(entry)) => {
                debug!(namespace = %self.name, key = %key, "Disk hit, backfilling memory");
                self.memory.put(key, entry.clone()).await?;
                Ok(Some((entry, HitTier::Disk)))
            }
            Ok(None) => {
                debug!(namespace = %self.name, key = %key, "Cache miss");
                Ok(None)
            }
            Err(e) => {
                warn!(namespace = %self.name, key = %key, error = %e, "Failed to read cached entry");
                Ok(None)
            }
        }
    }

    /// Payload stored for `key`. Absent, expired and unreadable entries all return `None`.
    ///
    /// Only calls that return a payload count as hits.
    pub async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = CacheKey::new(key)?;
        let Some((entry, tier)) = self.load(&key).await? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if entry.metadata.is_expired_at(Utc::now()) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(namespace = %self.name, key = %key, "Withholding expired entry");
            return Ok(None);
        }

        let counter = match tier {
            HitTier::Memory => &self.memory_hits,
            HitTier::Disk => &self.disk_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.payload.clone()))
    }

    /// Typed variant of [`CacheManager::fetch`]
    pub async fn fetch_object<T: Cachable>(&self, key: &str) -> Result<Option<T>> {
        match self.fetch(key).await? {
            Some(payload) => Ok(Some(T::from_cache_bytes(&payload)?)),
            None => Ok(None),
        }
    }

    /// Write `payload` for `key` to disk, then to memory. `None` stores empty content.
    ///
    /// If the disk write fails neither tier changes.
    pub async fn store(
        &self,
        key: &str,
        payload: Option<&[u8]>,
        options: StoreOptions,
    ) -> Result<()> {
        let key = CacheKey::new(key)?;
        let entry = Arc::new(CacheEntry::new(
            &key,
            payload.unwrap_or_default().to_vec(),
            options.expires_at,
            options.identifying_attribute,
        ));

        let _guard = self.stripe(&key).write().await;
        self.disk.put(&key, entry.clone()).await?;
        self.memory.put(&key, entry).await?;
        debug!(namespace = %self.name, key = %key, "Stored entry");
        Ok(())
    }

    /// Typed variant of [`CacheManager::store`]
    pub async fn store_object<T: Cachable>(
        &self,
        key: &str,
        value: &T,
        options: StoreOptions,
    ) -> Result<()> {
        let payload = value.to_cache_bytes()?;
        self.store(key, Some(&payload), options).await
    }

    /// Copy a file into the cache as the payload for `key`.
    ///
    /// The payload is not loaded into memory; the next fetch backfills it.
    pub async fn import_file(&self, key: &str, source: &Path, options: StoreOptions) -> Result<()> {
        let key = CacheKey::new(key)?;

        let _guard = self.stripe(&key).write().await;
        self.disk
            .import_file(
                &key,
                source,
                options.expires_at,
                options.identifying_attribute,
            )
            .await?;
        self.memory.delete(&key).await?;
        debug!(namespace = %self.name, key = %key, source = ?source, "Imported file");
        Ok(())
    }

    /// Whether `key` is present and current, judged from metadata only
    pub async fn is_current(&self, key: &str, expected_attribute: Option<&str>) -> Result<bool> {
        let key = CacheKey::new(key)?;

        let metadata = match self.memory.get_metadata(&key).await? {
            Some(metadata) => Some(metadata),
            None => match self.disk.get_metadata(&key).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(namespace = %self.name, key = %key, error = %e, "Failed to read metadata");
                    None
                }
            },
        };

        Ok(metadata.is_some_and(|m| m.is_current(expected_attribute)))
    }

    /// Whether an entry exists for `key`, expired or not
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let key = CacheKey::new(key)?;
        if self.memory.get_metadata(&key).await?.is_some() {
            return Ok(true);
        }
        self.disk.contains(&key).await
    }

    /// Remove `key` from both tiers. Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = CacheKey::new(key)?;

        let _guard = self.stripe(&key).write().await;
        self.disk.delete(&key).await?;
        self.memory.delete(&key).await?;
        debug!(namespace = %self.name, key = %key, "Deleted entry");
        Ok(())
    }

    /// Path of the payload file for `key`, valid at the time of the call
    pub async fn location(&self, key: &str) -> Result<Option<PathBuf>> {
        let key = CacheKey::new(key)?;
        match self.disk.location(&key).await {
            Ok(location) => Ok(location),
            Err(e) => {
                warn!(namespace = %self.name, key = %key, error = %e, "Failed to locate entry");
                Ok(None)
            }
        }
    }

    /// Empty the memory tier only
    pub fn clear_memory(&self) {
        self.memory.invalidate_all();
        info!(namespace = %self.name, "Memory cache cleared");
    }

    /// Empty both tiers. Memory is cleared even when the disk clear fails.
    pub async fn clear_all(&self) -> Result<()> {
        let mut guards = Vec::with_capacity(self.stripes.len());
        for stripe in &self.stripes {
            guards.push(stripe.write().await);
        }

        self.memory.clear().await?;
        self.disk.clear().await?;
        info!(namespace = %self.name, "Cache cleared");
        Ok(())
    }

    /// Remove files left behind by interrupted writes. Returns the number removed.
    pub async fn sweep(&self) -> Result<usize> {
        let mut guards = Vec::with_capacity(self.stripes.len());
        for stripe in &self.stripes {
            guards.push(stripe.write().await);
        }
        self.disk.sweep().await
    }

    pub fn periodic_memory_clear_enabled(&self) -> bool {
        self.reclaimer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start or stop clearing the memory tier every reclaim interval.
    ///
    /// Enabling requires a tokio runtime. Setting the current value again does nothing.
    pub fn set_periodic_memory_clear(&self, enabled: bool) -> Result<()> {
        let mut reclaimer = self
            .reclaimer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match (enabled, reclaimer.take()) {
            (true, Some(timer)) => *reclaimer = Some(timer),
            (true, None) => {
                let memory = self.memory.clone();
                let name = self.name.clone();
                let timer = RepeatingTimer::schedule(self.reclaim_interval, move || {
                    memory.invalidate_all();
                    debug!(namespace = %name, "Periodic memory reclamation");
                })?;
                info!(
                    namespace = %self.name,
                    interval_secs = self.reclaim_interval.as_secs(),
                    "Periodic memory clearing enabled"
                );
                *reclaimer = Some(timer);
            }
            (false, Some(timer)) => {
                timer.cancel();
                info!(namespace = %self.name, "Periodic memory clearing disabled");
            }
            (false, None) => {}
        }
        Ok(())
    }

    /// Current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let (memory_entries, memory_size) = self.memory.usage().await;
        CacheStats {
            memory_entries,
            memory_size,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
