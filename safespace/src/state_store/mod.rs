//! Persistent sandbox state store.
//!
//! A single SQLite file under the user's config directory. `name` is
//! enforced unique at the application layer: a second `save` under an
//! already-used name fails rather than silently stealing the slot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::errors::{SafeSpaceError, SafeSpaceResult};

/// One row of the `environments` table: the sandbox's env snapshot and
/// facet flags (`state`) plus mode/timestamp bookkeeping (`metadata`), both
/// stored as JSON blobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistentSandboxRecord {
    pub id: String,
    pub name: Option<String>,
    pub root_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub state: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Lookup key for [`StateStore::get`]/[`StateStore::delete`].
pub enum Lookup<'a> {
    Id(&'a str),
    Name(&'a str),
}

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (creating if absent) the store at `db_path`, running schema
    /// migration.
    pub fn open(db_path: &Path) -> SafeSpaceResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS environments (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE,
                root_dir TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                state TEXT NOT NULL,
                metadata TEXT NOT NULL
            )",
        )?;
        Ok(Self { conn })
    }

    /// Open the default per-user store path under the config directory.
    pub fn open_default() -> SafeSpaceResult<Self> {
        Self::open(&default_db_path())
    }

    /// Upsert `record` keyed by `id`, stamping `last_accessed = now`. Fails
    /// if `record.name` is already taken by a different `id`.
    pub fn save(&self, record: &PersistentSandboxRecord) -> SafeSpaceResult<()> {
        if let Some(name) = &record.name {
            if let Some(existing) = self.get(Lookup::Name(name))? {
                if existing.id != record.id {
                    return Err(SafeSpaceError::StateStoreFailure(format!(
                        "name '{name}' already in use by sandbox {}",
                        existing.id
                    )));
                }
            }
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO environments
                (id, name, root_dir, created_at, last_accessed, state, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                root_dir = excluded.root_dir,
                last_accessed = excluded.last_accessed,
                state = excluded.state,
                metadata = excluded.metadata",
            params![
                record.id,
                record.name,
                record.root_dir.to_string_lossy(),
                record.created_at.to_rfc3339(),
                now,
                record.state.to_string(),
                record.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a record by id or name, touching `last_accessed` on hit.
    pub fn get(&self, key: Lookup<'_>) -> SafeSpaceResult<Option<PersistentSandboxRecord>> {
        let found = match key {
            Lookup::Id(id) => self
                .conn
                .query_row(
                    "SELECT id, name, root_dir, created_at, last_accessed, state, metadata
                     FROM environments WHERE id = ?1",
                    params![id],
                    row_to_record,
                )
                .optional()?,
            Lookup::Name(name) => self
                .conn
                .query_row(
                    "SELECT id, name, root_dir, created_at, last_accessed, state, metadata
                     FROM environments WHERE name = ?1",
                    params![name],
                    row_to_record,
                )
                .optional()?,
        };

        if let Some(record) = &found {
            self.conn.execute(
                "UPDATE environments SET last_accessed = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), record.id],
            )?;
        }
        Ok(found)
    }

    pub fn list(&self) -> SafeSpaceResult<Vec<PersistentSandboxRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, root_dir, created_at, last_accessed, state, metadata
             FROM environments ORDER BY last_accessed DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> SafeSpaceResult<bool> {
        let affected = self.conn.execute("DELETE FROM environments WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Delete records whose `last_accessed` is older than `max_age_days`.
    pub fn purge_old(&self, max_age_days: i64) -> SafeSpaceResult<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(max_age_days)).to_rfc3339();
        let affected = self
            .conn
            .execute("DELETE FROM environments WHERE last_accessed < ?1", params![cutoff])?;
        Ok(affected as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistentSandboxRecord> {
    let root_dir: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let last_accessed: String = row.get(4)?;
    let state: String = row.get(5)?;
    let metadata: String = row.get(6)?;

    Ok(PersistentSandboxRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        root_dir: PathBuf::from(root_dir),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_accessed: DateTime::parse_from_rfc3339(&last_accessed)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        state: serde_json::from_str(&state).unwrap_or_else(|_| serde_json::json!({})),
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
    })
}

fn default_db_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("safespace")
        .join("state.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, name: &str) -> PersistentSandboxRecord {
        let now = Utc::now();
        PersistentSandboxRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            root_dir: PathBuf::from("/tmp/alpha"),
            created_at: now,
            last_accessed: now,
            state: serde_json::json!({ "network_enabled": true }),
            metadata: serde_json::json!({ "mode": "persistent" }),
        }
    }

    #[test]
    fn save_then_get_by_name_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();
        store.save(&sample("id-1", "alpha")).unwrap();

        let fetched = store.get(Lookup::Name("alpha")).unwrap().unwrap();
        assert_eq!(fetched.root_dir, PathBuf::from("/tmp/alpha"));
        assert_eq!(fetched.state["network_enabled"], true);
    }

    #[test]
    fn save_with_same_id_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();
        store.save(&sample("id-1", "alpha")).unwrap();

        let mut updated = sample("id-1", "alpha");
        updated.state = serde_json::json!({ "network_enabled": false });
        store.save(&updated).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state["network_enabled"], false);
    }

    #[test]
    fn save_with_name_taken_by_different_id_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();
        store.save(&sample("id-1", "alpha")).unwrap();
        assert!(store.save(&sample("id-2", "alpha")).is_err());
    }

    #[test]
    fn delete_removes_row() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();
        store.save(&sample("id-1", "alpha")).unwrap();
        assert!(store.delete("id-1").unwrap());
        assert!(store.get(Lookup::Id("id-1")).unwrap().is_none());
    }

    #[test]
    fn purge_old_removes_stale_entries_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();

        let mut stale = sample("id-1", "stale");
        stale.last_accessed = Utc::now() - chrono::Duration::days(30);
        store.save(&stale).unwrap();
        store.save(&sample("id-2", "fresh")).unwrap();

        let purged = store.purge_old(7).unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(Lookup::Id("id-1")).unwrap().is_none());
        assert!(store.get(Lookup::Id("id-2")).unwrap().is_some());
    }

    #[test]
    fn successive_saves_have_nondecreasing_last_accessed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(&tmp.path().join("state.db")).unwrap();
        store.save(&sample("id-1", "alpha")).unwrap();
        let t1 = store.get(Lookup::Id("id-1")).unwrap().unwrap().last_accessed;
        store.save(&sample("id-1", "alpha")).unwrap();
        let t2 = store.get(Lookup::Id("id-1")).unwrap().unwrap().last_accessed;
        assert!(t2 >= t1);
    }
}
