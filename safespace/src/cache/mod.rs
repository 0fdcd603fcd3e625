//! Content-addressed artifact cache.
//!
//! A write-once, read-many store keyed by the SHA-256 of its content, with a
//! budgeted LRU eviction policy and a crash-safe JSON index. Shared across
//! sandboxes under a single directory; a single process is expected to be
//! the writer.
//!
//! [`CacheInner`] holds the index and on-disk storage with no locking
//! awareness; [`ArtifactCache`] is the `RwLock`-wrapped façade callers use.
//! Uses a flat layout: `<cache>/<hex>` holds content, `<cache>/cache_index.json`
//! holds metadata.

mod download;
mod index;
mod test_artifact;
mod vm_image;

pub use download::Downloader;
pub use test_artifact::TestArtifactStore;
pub use vm_image::VmImageStore;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::errors::{SafeSpaceError, SafeSpaceResult};
use index::CacheIndex;

const HASH_CHUNK_SIZE: usize = 8192;

/// Artifact type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    VmImage,
    TestArtifact,
    ContainerImage,
    Package,
    Config,
    Data,
    Other,
}

/// Metadata record for one cache entry, keyed by its hex SHA-256.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub size: u64,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Mutable cache state: index plus the directory it is backed by. No
/// locking awareness — wrapped by [`ArtifactCache`].
struct CacheInner {
    dir: PathBuf,
    index: CacheIndex,
}

impl CacheInner {
    fn content_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn flush(&self) -> SafeSpaceResult<()> {
        self.index.save(&self.dir.join("cache_index.json"))
    }

    fn on_disk_size(&self) -> u64 {
        self.index.entries().map(|a| a.size).sum()
    }

    /// Remove stale entries whose content file is missing; returns true if
    /// anything was repaired.
    fn repair_if_missing(&mut self, key: &str) -> bool {
        if self.index.get(key).is_some() && !self.content_path(key).exists() {
            self.index.remove(key);
            true
        } else {
            false
        }
    }

    fn evict_to_budget(&mut self, target_bytes: u64) -> SafeSpaceResult<u64> {
        let mut freed = 0u64;
        let mut entries: Vec<Artifact> = self.index.entries().cloned().collect();
        entries.sort_by(|a, b| {
            a.last_access
                .cmp(&b.last_access)
                .then(b.access_count.cmp(&a.access_count))
        });

        for entry in entries {
            if self.on_disk_size() <= target_bytes {
                break;
            }
            let path = self.content_path(&entry.key);
            if path.exists() {
                std::fs::remove_file(&path)?;
                freed += entry.size;
            }
            self.index.remove(&entry.key);
        }
        Ok(freed)
    }
}

/// Thread-safe content-addressed artifact cache.
#[derive(Clone)]
pub struct ArtifactCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl ArtifactCache {
    /// Open (or create) the cache directory at `dir`, loading its index.
    /// A corrupt index starts empty in-memory (`SafeSpaceError::IndexCorruption`)
    /// — on-disk content is preserved for operator recovery, just not
    /// indexed until the next successful flush.
    pub fn open(dir: impl Into<PathBuf>) -> SafeSpaceResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let index_path = dir.join("cache_index.json");
        let index = match CacheIndex::load(&index_path) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "cache index corrupt, starting empty in-memory index");
                CacheIndex::empty()
            }
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(CacheInner { dir, index })),
        })
    }

    pub async fn dir(&self) -> PathBuf {
        self.inner.read().await.dir.clone()
    }

    /// Insert `path`'s contents, tagged `artifact_type`, evicting LRU
    /// entries first to make room under the cache's byte budget.
    pub async fn put(
        &self,
        path: &Path,
        artifact_type: ArtifactType,
        source_url: Option<String>,
        custom_meta: Option<serde_json::Value>,
        byte_budget: u64,
    ) -> SafeSpaceResult<String> {
        let key = hash_file(path)?;
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.index.get(&key).cloned() {
            if inner.content_path(&key).exists() {
                inner.index.touch(&key);
                inner.flush()?;
                return Ok(existing.key);
            }
            inner.index.remove(&key);
        }

        let size = std::fs::metadata(path)?.len();
        if size > 0 {
            let projected = inner.on_disk_size() + size;
            if projected > byte_budget {
                inner.evict_to_budget(byte_budget.saturating_sub(size))?;
            }
        }

        let dest = inner.content_path(&key);
        let copy_result = std::fs::copy(path, &dest).and_then(|_| {
            let mut perms = std::fs::metadata(&dest)?.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                perms.set_mode(0o400);
            }
            std::fs::set_permissions(&dest, perms)
        });

        if let Err(e) = copy_result {
            let _ = std::fs::remove_file(&dest);
            return Err(SafeSpaceError::TransientFilesystem(e.to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());

        let now = Utc::now();
        let artifact = Artifact {
            key: key.clone(),
            name,
            artifact_type,
            size,
            source_url,
            created_at: now,
            last_access: now,
            access_count: 1,
            metadata: custom_meta.unwrap_or_else(|| serde_json::json!({})),
        };
        inner.index.insert(artifact);
        inner.flush()?;
        Ok(key)
    }

    /// Look up `key`, optionally copying the content to `out_path`. Returns
    /// `None` if absent or if the indexed content file is missing (and
    /// repairs the index in that case).
    pub async fn get(&self, key: &str, out_path: Option<&Path>) -> SafeSpaceResult<Option<PathBuf>> {
        let mut inner = self.inner.write().await;
        if inner.repair_if_missing(key) {
            inner.flush()?;
            return Ok(None);
        }
        if inner.index.get(key).is_none() {
            return Ok(None);
        }

        inner.index.touch(key);
        inner.flush()?;

        let content_path = inner.content_path(key);
        match out_path {
            Some(dest) => {
                std::fs::copy(&content_path, dest)?;
                Ok(Some(dest.to_path_buf()))
            }
            None => Ok(Some(content_path)),
        }
    }

    pub async fn contains(&self, key: &str) -> SafeSpaceResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.repair_if_missing(key) {
            inner.flush()?;
            return Ok(false);
        }
        Ok(inner.index.get(key).is_some())
    }

    pub async fn list(&self, artifact_type: Option<ArtifactType>) -> Vec<Artifact> {
        let inner = self.inner.read().await;
        inner
            .index
            .entries()
            .filter(|a| artifact_type.map(|t| t == a.artifact_type).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn remove(&self, key: &str) -> SafeSpaceResult<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.index.get(key).is_some();
        if existed {
            let path = inner.content_path(key);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            inner.index.remove(key);
            inner.flush()?;
        }
        Ok(existed)
    }

    pub async fn clear(&self) -> SafeSpaceResult<()> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner.index.entries().map(|a| a.key.clone()).collect();
        for key in keys {
            let path = inner.content_path(&key);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        inner.index = CacheIndex::empty();
        inner.flush()?;
        Ok(())
    }

    /// Recompute the SHA-256 of every content file; remove mismatches and
    /// entries whose file is missing.
    pub async fn verify_integrity(&self) -> SafeSpaceResult<(Vec<String>, Vec<String>)> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner.index.entries().map(|a| a.key.clone()).collect();
        let mut valid = Vec::new();
        let mut invalid = Vec::new();

        for key in keys {
            let path = inner.content_path(&key);
            if !path.exists() {
                invalid.push(key.clone());
                inner.index.remove(&key);
                continue;
            }
            match hash_file(&path) {
                Ok(actual) if actual == key => valid.push(key),
                _ => {
                    invalid.push(key.clone());
                    let _ = std::fs::remove_file(&path);
                    inner.index.remove(&key);
                }
            }
        }
        inner.flush()?;
        Ok((valid, invalid))
    }

    /// LRU-evict until on-disk size is at or below `target_bytes`. Returns
    /// bytes freed.
    pub async fn cleanup(&self, target_bytes: u64) -> SafeSpaceResult<u64> {
        let mut inner = self.inner.write().await;
        let freed = inner.evict_to_budget(target_bytes)?;
        inner.flush()?;
        Ok(freed)
    }

    pub async fn total_bytes(&self) -> u64 {
        self.inner.read().await.on_disk_size()
    }
}

/// Compute the hex SHA-256 of a file's contents, streaming in
/// `HASH_CHUNK_SIZE`-byte chunks so large artifacts don't need to fit in
/// memory at once.
pub fn hash_file(path: &Path) -> SafeSpaceResult<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the hex SHA-256 of an in-memory byte slice (used by the
/// downloader and empty-file boundary tests).
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_and_matches_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let file = write_temp(src_dir.path(), "a.txt", b"hello world");

        let key = cache
            .put(&file, ArtifactType::Data, None, None, u64::MAX)
            .await
            .unwrap();

        let fetched = cache.get(&key, None).await.unwrap().unwrap();
        let actual = hash_file(&fetched).unwrap();
        assert_eq!(actual, key);
    }

    #[tokio::test]
    async fn duplicate_put_deduplicates_and_bumps_access_count() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let a = write_temp(src_dir.path(), "a.txt", b"abc");
        let b = write_temp(src_dir.path(), "b.txt", b"abc");

        let key1 = cache.put(&a, ArtifactType::Data, None, None, u64::MAX).await.unwrap();
        let key2 = cache.put(&b, ArtifactType::Data, None, None, u64::MAX).await.unwrap();
        assert_eq!(key1, key2);
        assert_eq!(
            key1,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let list = cache.list(None).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].access_count, 2);
    }

    #[tokio::test]
    async fn empty_file_hashes_to_sha256_of_empty_string() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let empty = write_temp(src_dir.path(), "empty", b"");

        let key = cache.put(&empty, ArtifactType::Data, None, None, u64::MAX).await.unwrap();
        assert_eq!(
            key,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn cleanup_evicts_lru_first_until_under_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();

        let a = write_temp(src_dir.path(), "a", &vec![1u8; 100]);
        let b = write_temp(src_dir.path(), "b", &vec![2u8; 100]);
        cache.put(&a, ArtifactType::Data, None, None, u64::MAX).await.unwrap();
        // Ensure b sorts after a in last_access by touching a process tick.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        cache.put(&b, ArtifactType::Data, None, None, u64::MAX).await.unwrap();

        let freed = cache.cleanup(100).await.unwrap();
        assert!(freed >= 100);
        assert!(cache.total_bytes().await <= 100);
    }

    #[tokio::test]
    async fn contains_repairs_stale_index_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let file = write_temp(src_dir.path(), "a", b"xyz");
        let key = cache.put(&file, ArtifactType::Data, None, None, u64::MAX).await.unwrap();

        // Simulate external deletion of the content file.
        std::fs::remove_file(cache.dir().await.join(&key)).unwrap();

        assert!(!cache.contains(&key).await.unwrap());
        assert!(cache.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn verify_integrity_removes_tampered_content() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let file = write_temp(src_dir.path(), "a", b"original");
        let key = cache.put(&file, ArtifactType::Data, None, None, u64::MAX).await.unwrap();

        std::fs::write(cache.dir().await.join(&key), b"tampered").unwrap();

        let (valid, invalid) = cache.verify_integrity().await.unwrap();
        assert!(valid.is_empty());
        assert_eq!(invalid, vec![key]);
    }

    #[tokio::test]
    async fn corrupt_index_file_starts_empty_without_losing_content() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("cache_index.json"), b"{ not json").unwrap();
        // Pre-existing content file an operator might want to recover.
        std::fs::write(cache_dir.join("deadbeef"), b"orphaned").unwrap();

        let cache = ArtifactCache::open(&cache_dir).unwrap();
        assert!(cache.list(None).await.is_empty());
        assert!(cache_dir.join("deadbeef").exists());
    }
}
