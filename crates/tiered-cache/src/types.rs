//! Cache types

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A validated cache key.
///
/// Keys are opaque: they are never interpreted as paths. On disk a key is
/// addressed by the hex SHA-256 of its UTF-8 bytes (see [`CacheKey::storage_id`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a caller-supplied key. Empty keys and keys containing NUL are rejected.
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() || key.contains('\0') {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable storage identifier for this key. Part of the on-disk format.
    pub fn storage_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = CacheError;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}

/// Validity metadata recorded alongside every cached payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub key: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub identifying_attribute: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub size: u64,
}

impl EntryMetadata {
    pub fn new(
        key: &CacheKey,
        size: u64,
        expires_at: Option<DateTime<Utc>>,
        identifying_attribute: Option<String>,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            expires_at,
            identifying_attribute,
            stored_at: Utc::now(),
            size,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether the entry is still current at `now` given an optional expected validator.
    ///
    /// Expiry always wins. With an expected validator the stored one must be present and equal;
    /// an entry without a recorded validator cannot prove it is current.
    pub fn is_current_at(&self, expected_attribute: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        match (expected_attribute, self.identifying_attribute.as_deref()) {
            (Some(expected), Some(stored)) => expected == stored,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn is_current(&self, expected_attribute: Option<&str>) -> bool {
        self.is_current_at(expected_attribute, Utc::now())
    }
}

/// A payload together with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub metadata: EntryMetadata,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn new(
        key: &CacheKey,
        payload: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
        identifying_attribute: Option<String>,
    ) -> Self {
        let metadata =
            EntryMetadata::new(key, payload.len() as u64, expires_at, identifying_attribute);
        Self { metadata, payload }
    }
}

/// Statistics about a cache manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub memory_size: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
}
