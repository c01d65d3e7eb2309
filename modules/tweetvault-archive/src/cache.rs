// Durable JSON caches: read fully at start, rewritten whole.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use tweetvault_common::{CanonicalRecord, MergePolicy, RetentionPolicy};

use crate::error::{ArchiveError, Result};
use crate::references::ReferenceCollector;
use crate::store::RecordStore;

/// Read a JSON file. A missing or unreadable file yields the default so a
/// damaged cache costs a re-fetch, not the run.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache file yet, starting empty");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache file unreadable, starting empty");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache file corrupt, starting empty");
            T::default()
        }
    }
}

/// Pretty-print `value` to `path` through a temporary sibling and rename, so
/// the cache is never half-written.
pub fn save_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".cache-")
        .suffix(".json.part")
        .tempfile_in(&dir)
        .map_err(|e| ArchiveError::io(&dir, e))?;
    serde_json::to_writer_pretty(temp.as_file_mut(), value).map_err(|e| ArchiveError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    temp.as_file_mut()
        .flush()
        .map_err(|e| ArchiveError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| ArchiveError::io(path, e.error))?;
    Ok(())
}

/// The merged-record cache: identity -> canonical record.
pub struct RecordCache {
    path: PathBuf,
    retention: RetentionPolicy,
}

impl RecordCache {
    pub fn new(path: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            path: path.into(),
            retention,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, policy: MergePolicy) -> RecordStore {
        let snapshot: BTreeMap<String, CanonicalRecord> = load_json_or_default(&self.path);
        info!(path = %self.path.display(), records = snapshot.len(), "Loaded record cache");
        RecordStore::from_snapshot(policy, snapshot)
    }

    pub fn save(&self, store: &RecordStore) -> Result<()> {
        let snapshot = retained(store, self.retention);
        let dropped = store.len() - snapshot.len();
        save_json_pretty(&self.path, &snapshot)?;
        debug!(
            path = %self.path.display(),
            records = snapshot.len(),
            dropped,
            "Saved record cache"
        );
        Ok(())
    }
}

/// Records that survive `policy`.
pub fn retained(store: &RecordStore, policy: RetentionPolicy) -> BTreeMap<String, CanonicalRecord> {
    match policy {
        RetentionPolicy::KeepAll => store.snapshot(),
        RetentionPolicy::ArchiveAndReferenced => {
            let collector = ReferenceCollector::new();
            let mut keep = BTreeSet::new();
            for record in store.iter().filter(|r| r.provenance.from_archive) {
                keep.insert(record.id.clone());
                keep.extend(collector.direct_references(record));
            }
            store
                .iter()
                .filter(|r| keep.contains(&r.id))
                .map(|r| (r.id.clone(), r.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tweetvault_common::{Provenance, Value};

    fn sample_store() -> RecordStore {
        let mut store = RecordStore::new(MergePolicy::default());
        store.merge(
            "1",
            Value::from(json!({"id_str": "1", "in_reply_to_status_id_str": "2"})),
            &Provenance::archive(),
        );
        store.merge("2", Value::from(json!({"id_str": "2"})), &Provenance::api());
        store.merge("3", Value::from(json!({"id_str": "3"})), &Provenance::api());
        store
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let map: BTreeMap<String, u32> = load_json_or_default(&dir.path().join("absent.json"));
        assert!(map.is_empty());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let map: BTreeMap<String, u32> = load_json_or_default(&path);
        assert!(map.is_empty());
    }

    #[test]
    fn record_cache_round_trips_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RecordCache::new(dir.path().join("nested/records.json"), RetentionPolicy::KeepAll);
        let store = sample_store();
        cache.save(&store).unwrap();

        let loaded = cache.load(MergePolicy::default());
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert!(loaded.get("1").unwrap().provenance.from_archive);

        let text = std::fs::read_to_string(cache.path()).unwrap();
        assert!(text.contains("\n  "), "cache should be pretty-printed");
    }

    #[test]
    fn keep_all_retains_unrelated_records() {
        let store = sample_store();
        assert_eq!(retained(&store, RetentionPolicy::KeepAll).len(), 3);
    }

    #[test]
    fn archive_and_referenced_prunes_unrelated_records() {
        let store = sample_store();
        let kept = retained(&store, RetentionPolicy::ArchiveAndReferenced);
        assert!(kept.contains_key("1"));
        assert!(kept.contains_key("2"));
        assert!(!kept.contains_key("3"));
    }
}
