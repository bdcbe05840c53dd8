//! Two-tier named content cache
//!
//! A size-bounded memory tier in front of a durable file-based tier. Entries carry an
//! optional expiry time and an optional identifying attribute (an etag-like validator),
//! so callers can ask whether an entry is still current without reading its payload.
//! Each named [`CacheManager`] owns its own directory namespace; [`CacheRegistry`]
//! guarantees one manager per name.

mod cachable;
mod config;
mod error;
mod manager;
mod memory;
mod persistent;
mod registry;
mod tier;
mod timer;
mod types;

pub use cachable::{Cachable, Json};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use manager::{CacheManager, StoreOptions};
pub use memory::MemoryStore;
pub use persistent::PersistentStore;
pub use registry::{CacheRegistry, DEFAULT_MANAGER_NAME};
pub use tier::CacheTier;
pub use timer::RepeatingTimer;
pub use types::{CacheEntry, CacheKey, CacheStats, EntryMetadata};
