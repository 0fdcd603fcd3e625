//! JSON-backed cache index.
//!
//! A single JSON object keyed by hex SHA-256. Unknown fields and missing
//! `metadata` are tolerated on load, so an older or newer SafeSpace version
//! reading the same cache directory doesn't choke on a schema it doesn't
//! fully recognize.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;

use crate::errors::SafeSpaceResult;

use super::Artifact;

pub struct CacheIndex {
    entries: HashMap<String, Artifact>,
}

impl CacheIndex {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> SafeSpaceResult<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let raw = std::fs::read_to_string(path)?;
        let entries: HashMap<String, Artifact> = serde_json::from_str(&raw)?;
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> SafeSpaceResult<()> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        // Atomic replace: write to a sibling temp file then rename, so a
        // crash mid-write never leaves a half-written index.
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, raw)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.entries.insert(artifact.key.clone(), artifact);
    }

    pub fn remove(&mut self, key: &str) -> Option<Artifact> {
        self.entries.remove(key)
    }

    pub fn touch(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = Utc::now();
            entry.access_count += 1;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactType;

    fn sample(key: &str) -> Artifact {
        let now = Utc::now();
        Artifact {
            key: key.to_string(),
            name: "sample".to_string(),
            artifact_type: ArtifactType::Data,
            size: 10,
            source_url: None,
            created_at: now,
            last_access: now,
            access_count: 1,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut index = CacheIndex::empty();
        index.insert(sample("abc123"));
        index.save(&path).unwrap();

        let loaded = CacheIndex::load(&path).unwrap();
        assert!(loaded.get("abc123").is_some());
    }

    #[test]
    fn touch_increments_access_count() {
        let mut index = CacheIndex::empty();
        index.insert(sample("k"));
        index.touch("k");
        index.touch("k");
        assert_eq!(index.get("k").unwrap().access_count, 3);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let index = CacheIndex::load(&path).unwrap();
        assert_eq!(index.entries().count(), 0);
    }

    #[test]
    fn load_tolerates_extra_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"abc": {"key":"abc","name":"n","type":"data","size":1,
               "source_url":null,"created_at":"2024-01-01T00:00:00Z",
               "last_access":"2024-01-01T00:00:00Z","access_count":1,
               "future_field": "ignored"}}"#,
        )
        .unwrap();
        let index = CacheIndex::load(&path).unwrap();
        assert!(index.get("abc").is_some());
    }
}
