//! File-based durable tier
//!
//! A namespace lives in `<root>/<hex(sha256(name))>`, so names that differ only
//! in case never share a directory. Layout inside it, with `K = hex(sha256(key))`:
//!
//! - `K.meta`: JSON metadata, the commit record for the entry
//! - `K-<C>.bin`: raw payload bytes, `C` = first 16 hex chars of the payload's SHA-256
//!
//! Writes land in `*.tmp` files and are renamed into place. The payload file is
//! renamed first and the metadata file last, so a reader that finds `K.meta`
//! always finds the payload it names. Clearing renames the whole directory to
//! `<root>/<hex(sha256(name))>.<pid>-<n>.tmp` before removing it.

use crate::error::{CacheError, Result};
use crate::tier::CacheTier;
use crate::types::{CacheEntry, CacheKey, EntryMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const META_EXTENSION: &str = "meta";
const BLOB_EXTENSION: &str = "bin";
const TEMP_EXTENSION: &str = "tmp";
const CONTENT_TAG_LEN: usize = 16;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata document as written to `K.meta`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetadata {
    #[serde(flatten)]
    metadata: EntryMetadata,
    /// File name of the payload, relative to the namespace directory
    blob: String,
}

/// Durable store for one manager namespace
pub struct PersistentStore {
    dir: PathBuf,
}

impl PersistentStore {
    pub fn new(root: &Path, namespace: &str) -> Self {
        Self {
            dir: Self::namespace_dir(root, namespace),
        }
    }

    /// Directory holding a namespace
    pub fn namespace_dir(root: &Path, namespace: &str) -> PathBuf {
        root.join(hex::encode(Sha256::digest(namespace.as_bytes())))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self, storage_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", storage_id, META_EXTENSION))
    }

    fn temp_path(&self, storage_id: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}.{}.{}", storage_id, n, TEMP_EXTENSION))
    }

    fn blob_name(storage_id: &str, content_hash: &[u8]) -> String {
        let tag = hex::encode(content_hash);
        format!(
            "{}-{}.{}",
            storage_id,
            &tag[..CONTENT_TAG_LEN],
            BLOB_EXTENSION
        )
    }

    async fn read_stored(&self, key: &CacheKey) -> Result<Option<StoredMetadata>> {
        let path = self.meta_path(&key.storage_id());
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::storage(key.as_str(), e)),
        };

        let stored: StoredMetadata = serde_json::from_slice(&raw).map_err(|e| {
            CacheError::storage(key.as_str(), io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        Ok(Some(stored))
    }

    /// Committed metadata whose payload file is present
    async fn read_committed(&self, key: &CacheKey) -> Result<Option<StoredMetadata>> {
        let Some(stored) = self.read_stored(key).await? else {
            return Ok(None);
        };

        match fs::metadata(self.dir.join(&stored.blob)).await {
            Ok(_) => Ok(Some(stored)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(key = %key, blob = %stored.blob, "Metadata refers to a missing payload");
                Ok(None)
            }
            Err(e) => Err(CacheError::storage(key.as_str(), e)),
        }
    }

    /// Name prefix of directories a clear of this namespace moved aside
    fn discarded_prefix(&self) -> String {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}.", name)
    }

    /// Remove directories earlier clears moved aside but failed to delete
    async fn purge_discarded(&self) {
        let Some(root) = self.dir.parent() else {
            return;
        };
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = ?root, error = %e, "Failed to scan for discarded namespaces");
                return;
            }
        };

        let prefix = self.discarded_prefix();
        let suffix = format!(".{}", TEMP_EXTENSION);
        loop {
            let item = match entries.next_entry().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = ?root, error = %e, "Failed to scan for discarded namespaces");
                    break;
                }
            };
            let name = item.file_name().to_string_lossy().into_owned();
            if !(name.starts_with(&prefix) && name.ends_with(&suffix)) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(item.path()).await {
                warn!(path = ?item.path(), error = %e, "Failed to remove discarded namespace");
            }
        }
    }

    /// Replace the metadata file, then drop the payload it superseded
    async fn commit(
        &self,
        key: &CacheKey,
        stored: &StoredMetadata,
        previous: Option<StoredMetadata>,
    ) -> Result<()> {
        let storage_id = key.storage_id();
        let json = serde_json::to_vec(stored)?;
        let temp = self.temp_path(&storage_id);
        let written = match write_file(&temp, &json).await {
            Ok(()) => fs::rename(&temp, self.meta_path(&storage_id)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::storage(key.as_str(), e));
        }

        if let Some(previous) = previous.filter(|p| p.blob != stored.blob) {
            self.remove_blob(&previous.blob).await;
        }
        Ok(())
    }

    async fn remove_blob(&self, blob: &str) {
        match fs::remove_file(self.dir.join(blob)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(blob = %blob, error = %e, "Failed to remove superseded payload"),
        }
    }

    /// Previous metadata for a key about to be overwritten. Unreadable metadata is
    /// treated as absent; its payload is left for [`PersistentStore::sweep`].
    async fn previous_for_overwrite(&self, key: &CacheKey) -> Option<StoredMetadata> {
        match self.read_stored(key).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(key = %key, error = %e, "Overwriting unreadable metadata");
                None
            }
        }
    }

    async fn ensure_dir(&self, key: &CacheKey) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::storage(key.as_str(), e))
    }

    /// Write a payload and its metadata for `key`, replacing any previous entry
    pub async fn put_payload(
        &self,
        key: &CacheKey,
        payload: &[u8],
        expires_at: Option<DateTime<Utc>>,
        identifying_attribute: Option<String>,
    ) -> Result<EntryMetadata> {
        let metadata =
            EntryMetadata::new(key, payload.len() as u64, expires_at, identifying_attribute);
        self.write_payload(key, payload, metadata).await
    }

    async fn write_payload(
        &self,
        key: &CacheKey,
        payload: &[u8],
        metadata: EntryMetadata,
    ) -> Result<EntryMetadata> {
        self.ensure_dir(key).await?;

        let storage_id = key.storage_id();
        let blob = Self::blob_name(&storage_id, &Sha256::digest(payload));
        let temp = self.temp_path(&storage_id);
        if let Err(e) = write_file(&temp, payload).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::storage(key.as_str(), e));
        }

        self.publish(key, temp, metadata, blob).await
    }

    /// Copy an existing file in as the payload for `key`, hashing it while copying
    pub async fn import_file(
        &self,
        key: &CacheKey,
        source: &Path,
        expires_at: Option<DateTime<Utc>>,
        identifying_attribute: Option<String>,
    ) -> Result<EntryMetadata> {
        self.ensure_dir(key).await?;

        let storage_id = key.storage_id();
        let temp = self.temp_path(&storage_id);
        let (size, digest) = match copy_hashing(source, &temp).await {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(CacheError::storage(key.as_str(), e));
            }
        };

        let metadata = EntryMetadata::new(key, size, expires_at, identifying_attribute);
        let blob = Self::blob_name(&storage_id, &digest);
        self.publish(key, temp, metadata, blob).await
    }

    async fn publish(
        &self,
        key: &CacheKey,
        temp: PathBuf,
        metadata: EntryMetadata,
        blob: String,
    ) -> Result<EntryMetadata> {
        if let Err(e) = fs::rename(&temp, self.dir.join(&blob)).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::storage(key.as_str(), e));
        }

        let previous = self.previous_for_overwrite(key).await;
        let stored = StoredMetadata { metadata, blob };
        if let Err(e) = self.commit(key, &stored, previous.clone()).await {
            // Only drop the new payload if no committed entry still points at it
            if previous.map_or(true, |p| p.blob != stored.blob) {
                self.remove_blob(&stored.blob).await;
            }
            return Err(e);
        }

        debug!(key = %key, size = stored.metadata.size, "Stored payload on disk");
        Ok(stored.metadata)
    }

    /// Path of the raw payload file for `key`, if an entry is committed
    pub async fn location(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        Ok(self
            .read_committed(key)
            .await?
            .map(|stored| self.dir.join(stored.blob)))
    }

    pub async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.read_committed(key).await?.is_some())
    }

    /// Remove temp files and payload files no metadata refers to.
    ///
    /// Must not run concurrently with writers to the same namespace.
    pub async fn sweep(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::namespace(e)),
        };

        let mut referenced = HashSet::new();
        let mut candidates = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(CacheError::namespace)? {
            let path = item.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(META_EXTENSION) => match fs::read(&path).await {
                    Ok(raw) => match serde_json::from_slice::<StoredMetadata>(&raw) {
                        Ok(stored) => {
                            referenced.insert(stored.blob);
                        }
                        Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable metadata"),
                    },
                    Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable metadata"),
                },
                Some(TEMP_EXTENSION) | Some(BLOB_EXTENSION) => candidates.push(path),
                _ => {}
            }
        }

        let mut removed = 0;
        for path in candidates {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if referenced.contains(name) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::namespace(e)),
            }
        }

        if removed > 0 {
            info!(dir = ?self.dir, removed, "Swept orphaned cache files");
        }
        Ok(removed)
    }
}

#[async_trait]
impl CacheTier for PersistentStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        let Some(stored) = self.read_stored(key).await? else {
            return Ok(None);
        };

        match fs::read(self.dir.join(&stored.blob)).await {
            Ok(payload) => Ok(Some(Arc::new(CacheEntry {
                metadata: stored.metadata,
                payload,
            }))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(key = %key, blob = %stored.blob, "Metadata refers to a missing payload");
                Ok(None)
            }
            Err(e) => Err(CacheError::storage(key.as_str(), e)),
        }
    }

    async fn get_metadata(&self, key: &CacheKey) -> Result<Option<EntryMetadata>> {
        Ok(self.read_committed(key).await?.map(|stored| stored.metadata))
    }

    async fn put(&self, key: &CacheKey, entry: Arc<CacheEntry>) -> Result<()> {
        self.write_payload(key, &entry.payload, entry.metadata.clone())
            .await
            .map(|_| ())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let stored = match self.read_stored(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "Deleting unreadable metadata");
                None
            }
        };

        match fs::remove_file(self.meta_path(&key.storage_id())).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::storage(key.as_str(), e)),
        }

        if let Some(stored) = stored {
            self.remove_blob(&stored.blob).await;
        }
        debug!(key = %key, "Deleted from disk");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        // Readers see the whole namespace or none of it; the rename is the clear.
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let discarded = self.dir.with_file_name(format!(
            "{}{}-{}.{}",
            self.discarded_prefix(),
            std::process::id(),
            n,
            TEMP_EXTENSION
        ));
        match fs::rename(&self.dir, &discarded).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::namespace(e)),
        }

        self.purge_discarded().await;
        info!(dir = ?self.dir, "Disk namespace cleared");
        Ok(())
    }
}

async fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

async fn copy_hashing(source: &Path, dest: &Path) -> io::Result<(u64, Vec<u8>)> {
    let mut input = fs::File::open(source).await?;
    let mut output = fs::File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        output.write_all(&buf[..n]).await?;
        size += n as u64;
    }
    output.sync_all().await?;

    Ok((size, hasher.finalize().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    async fn files_in(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut rd = fs::read_dir(dir).await.unwrap();
        while let Some(e) = rd.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[test]
    fn test_namespace_dir_encoding() {
        let root = Path::new("/cache");
        // sha256("hello")
        assert_eq!(
            PersistentStore::namespace_dir(root, "hello"),
            PathBuf::from(
                "/cache/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            )
        );

        for name in ["a/b", "..", ".", "Images"] {
            let dir = PersistentStore::namespace_dir(root, name);
            assert_eq!(dir.parent(), Some(root));
            let component = dir.file_name().unwrap().to_str().unwrap();
            assert_eq!(component.len(), 64);
            assert_eq!(component, component.to_lowercase());
        }
        assert_ne!(
            PersistentStore::namespace_dir(root, "Images"),
            PersistentStore::namespace_dir(root, "images")
        );
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("greeting");

        store
            .put_payload(&k, b"Hello, world!", None, Some("v1".to_string()))
            .await
            .unwrap();

        let entry = store.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.payload, b"Hello, world!");
        assert_eq!(entry.metadata.identifying_attribute.as_deref(), Some("v1"));
        assert_eq!(entry.metadata.size, 13);
    }

    #[tokio::test]
    async fn test_miss() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");

        assert!(store.get(&key("nothing")).await.unwrap().is_none());
        assert!(store.get_metadata(&key("nothing")).await.unwrap().is_none());
        assert!(store.location(&key("nothing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_length_payload_is_stored() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("empty");

        store.put_payload(&k, b"", None, None).await.unwrap();

        let entry = store.get(&k).await.unwrap().unwrap();
        assert!(entry.payload.is_empty());
        assert!(store.contains(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_payload_and_metadata() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("doc");
        let expiry = Utc::now() + Duration::hours(1);

        store
            .put_payload(&k, b"first", Some(expiry), Some("v1".to_string()))
            .await
            .unwrap();
        store.put_payload(&k, b"second", None, None).await.unwrap();

        let entry = store.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.payload, b"second");
        assert!(entry.metadata.expires_at.is_none());
        assert!(entry.metadata.identifying_attribute.is_none());

        // One metadata file and one payload file remain
        assert_eq!(files_in(store.dir()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_rewriting_same_payload_keeps_it() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("same");

        store.put_payload(&k, b"abc", None, None).await.unwrap();
        store
            .put_payload(&k, b"abc", None, Some("v2".to_string()))
            .await
            .unwrap();

        let entry = store.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.payload, b"abc");
        assert_eq!(entry.metadata.identifying_attribute.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_metadata_file_format() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("hello");

        store
            .put_payload(&k, b"payload", None, Some("etag".to_string()))
            .await
            .unwrap();

        let meta_path = store.dir().join(format!("{}.meta", k.storage_id()));
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&meta_path).await.unwrap()).unwrap();
        assert_eq!(json["key"], "hello");
        assert_eq!(json["identifying_attribute"], "etag");
        assert_eq!(json["size"], 7);
        let blob = json["blob"].as_str().unwrap();
        assert!(blob.starts_with(&k.storage_id()));
        assert!(blob.ends_with(".bin"));
    }

    #[tokio::test]
    async fn test_location_points_at_raw_payload() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("raw");

        store.put_payload(&k, b"raw bytes", None, None).await.unwrap();

        let path = store.location(&k).await.unwrap().unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"raw bytes");
    }

    #[tokio::test]
    async fn test_delete_removes_payload_and_metadata() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("gone");

        store.put_payload(&k, b"data", None, None).await.unwrap();
        store.delete(&k).await.unwrap();

        assert!(store.get(&k).await.unwrap().is_none());
        assert!(files_in(store.dir()).await.is_empty());

        // Deleting again is a no-op
        store.delete(&k).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_only_affects_own_namespace() {
        let dir = tempdir().unwrap();
        let a = PersistentStore::new(dir.path(), "a");
        let b = PersistentStore::new(dir.path(), "b");
        let k = key("shared");

        a.put_payload(&k, b"from a", None, None).await.unwrap();
        b.put_payload(&k, b"from b", None, None).await.unwrap();

        a.clear().await.unwrap();

        assert!(a.get(&k).await.unwrap().is_none());
        assert_eq!(b.get(&k).await.unwrap().unwrap().payload, b"from b");

        // Writable again after a clear
        a.put_payload(&k, b"again", None, None).await.unwrap();
        assert_eq!(a.get(&k).await.unwrap().unwrap().payload, b"again");
    }

    #[tokio::test]
    async fn test_missing_payload_hides_metadata() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("orphaned");

        store
            .put_payload(&k, b"gone soon", None, Some("v1".to_string()))
            .await
            .unwrap();
        let blob = store.location(&k).await.unwrap().unwrap();
        fs::remove_file(&blob).await.unwrap();

        assert!(store.get(&k).await.unwrap().is_none());
        assert!(store.get_metadata(&k).await.unwrap().is_none());
        assert!(store.location(&k).await.unwrap().is_none());
        assert!(!store.contains(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_moves_namespace_aside() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let other = PersistentStore::new(dir.path(), "other");
        let k = key("k");

        store.put_payload(&k, b"data", None, None).await.unwrap();
        other.put_payload(&k, b"kept", None, None).await.unwrap();

        // Left behind by an earlier clear that could not finish removing it
        let leftover = dir
            .path()
            .join(format!("{}7.{}", store.discarded_prefix(), TEMP_EXTENSION));
        fs::create_dir(&leftover).await.unwrap();
        fs::write(leftover.join("stale.bin"), b"stale").await.unwrap();

        store.clear().await.unwrap();

        let other_name = other.dir().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(files_in(dir.path()).await, vec![other_name]);
        assert_eq!(other.get(&k).await.unwrap().unwrap().payload, b"kept");

        // Clearing a namespace that was never written succeeds
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_import_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.dat");
        fs::write(&source, vec![7u8; 200_000]).await.unwrap();

        let store = PersistentStore::new(dir.path(), "test");
        let k = key("imported");
        let meta = store
            .import_file(&k, &source, None, Some("v9".to_string()))
            .await
            .unwrap();

        assert_eq!(meta.size, 200_000);
        let entry = store.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.payload, vec![7u8; 200_000]);
        // Source is copied, not moved
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_import_missing_file_fails_cleanly() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("missing");

        let err = store
            .import_file(&k, &dir.path().join("nope"), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::StorageIo { key: Some(ref key), .. } if key == "missing"));
        assert!(store.get(&k).await.unwrap().is_none());
        assert!(files_in(store.dir()).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_error() {
        let dir = tempdir().unwrap();
        // A file where the root directory should be
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"x").await.unwrap();

        let store = PersistentStore::new(&root, "test");
        let err = store
            .put_payload(&key("k"), b"data", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::StorageIo { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_storage_error() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("corrupt");
        store.put_payload(&k, b"data", None, None).await.unwrap();

        let meta_path = store.dir().join(format!("{}.meta", k.storage_id()));
        fs::write(&meta_path, b"{not json").await.unwrap();

        assert!(matches!(
            store.get_metadata(&k).await,
            Err(CacheError::StorageIo { .. })
        ));

        // Overwriting recovers the entry
        store.put_payload(&k, b"fresh", None, None).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap().unwrap().payload, b"fresh");
    }

    #[tokio::test]
    async fn test_sweep_removes_orphans() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "test");
        let k = key("kept");
        store.put_payload(&k, b"keep me", None, None).await.unwrap();

        fs::write(store.dir().join("deadbeef.3.tmp"), b"partial")
            .await
            .unwrap();
        fs::write(store.dir().join("deadbeef-0000000000000000.bin"), b"orphan")
            .await
            .unwrap();

        let removed = store.sweep().await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.get(&k).await.unwrap().unwrap().payload, b"keep me");
        assert_eq!(files_in(store.dir()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_on_missing_namespace() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::new(dir.path(), "never-written");
        assert_eq!(store.sweep().await.unwrap(), 0);
    }
}
