//! Test-artifact specialization: batch ingestion and time-based pruning.

use std::path::Path;

use chrono::Utc;
use walkdir::WalkDir;

use crate::errors::SafeSpaceResult;

use super::{ArtifactCache, ArtifactType};

pub struct TestArtifactStore {
    cache: ArtifactCache,
    byte_budget: u64,
}

impl TestArtifactStore {
    pub fn new(cache: ArtifactCache, byte_budget: u64) -> Self {
        Self { cache, byte_budget }
    }

    /// Ingest every file under `dir` (recursively) whose relative path does
    /// not match any glob-like substring in `exclude`, tagging each
    /// `test_artifact`. Returns the keys of ingested files.
    pub async fn ingest_directory(&self, dir: &Path, exclude: &[String]) -> SafeSpaceResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let rel_str = rel.to_string_lossy();
            if exclude.iter().any(|pattern| rel_str.contains(pattern.as_str())) {
                continue;
            }
            let key = self
                .cache
                .put(entry.path(), ArtifactType::TestArtifact, None, None, self.byte_budget)
                .await?;
            keys.push(key);
        }
        Ok(keys)
    }

    /// Remove `test_artifact`-tagged entries older than `max_age_days`
    /// (measured from `created_at`).
    pub async fn cleanup_test_artifacts(&self, max_age_days: i64) -> SafeSpaceResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut removed = 0u64;
        for artifact in self.cache.list(Some(ArtifactType::TestArtifact)).await {
            if artifact.created_at < cutoff {
                if self.cache.remove(&artifact.key).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingest_directory_skips_excluded_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let store = TestArtifactStore::new(cache.clone(), u64::MAX);

        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("keep.txt"), b"keep").unwrap();
        std::fs::create_dir_all(src.path().join("node_modules")).unwrap();
        std::fs::write(src.path().join("node_modules").join("skip.txt"), b"skip").unwrap();

        let keys = store
            .ingest_directory(src.path(), &["node_modules".to_string()])
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(cache.list(None).await.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_test_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(tmp.path().join("cache")).unwrap();
        let store = TestArtifactStore::new(cache.clone(), u64::MAX);

        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("a.txt");
        std::fs::write(&file, b"fresh").unwrap();
        store.ingest_directory(src.path(), &[]).await.unwrap();

        // max_age_days = 0 with a just-created artifact should not remove
        // it (created "now" is not older than "now").
        let removed = store.cleanup_test_artifacts(1).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(cache.list(None).await.len(), 1);
    }
}
