//! Cross-build metadata store
//!
//! A flat string key/value record persisted under the cache directory,
//! namespaced so multiple provisioners can share one cache dir without
//! colliding. The record read at open time describes the *previous*
//! build; writes accumulate in memory and `flush` rewrites the record
//! atomically (write-to-temp-then-rename), so a crash mid-build never
//! leaves a half-written file.
//!
//! This store is the single source of truth for "what happened last
//! time": it backs the sticky version default, the cache validity
//! checks, and the post-build report.

use crate::error::{MoltError, MoltResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::debug;

/// Directory under the cache dir holding metadata records
const STORE_DIR: &str = ".molt";

/// Persistent key/value record of build facts
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    /// Record left by the previous build (empty on a cold cache)
    previous: BTreeMap<String, String>,
    /// Facts recorded by the current build, written out by `flush`
    pending: BTreeMap<String, String>,
}

impl MetadataStore {
    /// Open the store for `namespace`, loading the previous build's
    /// record if one exists. An unparseable record is treated as absent
    /// rather than fatal; the facts it held are rediscoverable.
    pub async fn open(cache_dir: &Path, namespace: &str) -> MoltResult<Self> {
        let path = cache_dir.join(STORE_DIR).join(format!("{}.json", namespace));

        let previous = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    debug!("Discarding unreadable metadata record {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(MoltError::io(
                    format!("reading metadata record {}", path.display()),
                    e,
                ))
            }
        };

        debug!(
            "Opened metadata store {} ({} previous keys)",
            path.display(),
            previous.len()
        );

        Ok(Self {
            path,
            previous,
            pending: BTreeMap::new(),
        })
    }

    /// Read a fact from the previous build's record
    pub fn get(&self, key: &str) -> Option<&str> {
        self.previous.get(key).map(String::as_str)
    }

    /// Record a fact for the current build
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pending.insert(key.into(), value.into());
    }

    /// Record elapsed milliseconds since `start` under `key`
    pub fn time(&mut self, key: impl Into<String>, start: Instant) {
        let millis = start.elapsed().as_millis();
        self.set(key, millis.to_string());
    }

    /// Read a fact recorded during the current build
    pub fn pending(&self, key: &str) -> Option<&str> {
        self.pending.get(key).map(String::as_str)
    }

    /// Persist the current build's record, replacing the previous one.
    /// Only called after a successful build, which re-records every
    /// fact the next build needs.
    pub async fn flush(&self) -> MoltResult<()> {
        self.write_record(&self.pending).await
    }

    /// Record a failure without disturbing the previous build's facts.
    ///
    /// The record describes the artifact on disk, and a failed build
    /// never touches the artifact: erasing or overlaying the previous
    /// facts would break the next build's sticky version default and
    /// its cache validity checks. Only the failure diagnostic is added.
    pub async fn flush_failure(&self, reason: &str) -> MoltResult<()> {
        let mut record = self.previous.clone();
        record.insert("failure_reason".to_string(), reason.to_string());
        self.write_record(&record).await
    }

    /// Atomic write-temp-then-rename; the on-disk record stays intact
    /// until the rename lands.
    async fn write_record(&self, record: &BTreeMap<String, String>) -> MoltResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MoltError::io(format!("creating {}", parent.display()), e))?;
        }

        let content = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.new");

        fs::write(&tmp, content)
            .await
            .map_err(|e| MoltError::io(format!("writing metadata temp {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MoltError::io(format!("renaming metadata into {}", self.path.display()), e))?;

        debug!("Flushed {} metadata keys to {}", record.len(), self.path.display());
        Ok(())
    }

    /// Path of the on-disk record (for reporting)
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn cold_open_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert!(store.get("stack").is_none());
    }

    #[tokio::test]
    async fn flush_then_reopen_round_trips() {
        let temp = TempDir::new().unwrap();

        let mut store = MetadataStore::open(temp.path(), "python").await.unwrap();
        store.set("stack", "ubuntu-24");
        store.set("python_version_full", "3.12.7");
        store.flush().await.unwrap();

        let reopened = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert_eq!(reopened.get("stack"), Some("ubuntu-24"));
        assert_eq!(reopened.get("python_version_full"), Some("3.12.7"));
    }

    #[tokio::test]
    async fn flush_replaces_rather_than_merges() {
        let temp = TempDir::new().unwrap();

        let mut first = MetadataStore::open(temp.path(), "python").await.unwrap();
        first.set("stale_key", "old");
        first.flush().await.unwrap();

        let mut second = MetadataStore::open(temp.path(), "python").await.unwrap();
        second.set("fresh_key", "new");
        second.flush().await.unwrap();

        let third = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert!(third.get("stale_key").is_none());
        assert_eq!(third.get("fresh_key"), Some("new"));
    }

    #[tokio::test]
    async fn previous_record_survives_until_rename() {
        // Simulates a crash between temp write and rename: the temp file
        // existing must not affect what open() reads.
        let temp = TempDir::new().unwrap();

        let mut store = MetadataStore::open(temp.path(), "python").await.unwrap();
        store.set("stack", "ubuntu-24");
        store.flush().await.unwrap();

        let record = temp.path().join(".molt").join("python.json");
        std::fs::write(record.with_extension("json.new"), "{ torn").unwrap();

        let reopened = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert_eq!(reopened.get("stack"), Some("ubuntu-24"));
    }

    #[tokio::test]
    async fn failure_flush_preserves_previous_facts() {
        let temp = TempDir::new().unwrap();

        let mut good = MetadataStore::open(temp.path(), "python").await.unwrap();
        good.set("stack", "ubuntu-24");
        good.set("python_version_full", "3.12.7");
        good.set("package_manager", "pip");
        good.flush().await.unwrap();

        // A failed run records facts of its own before dying; none of
        // them may displace what the successful build wrote.
        let mut failed = MetadataStore::open(temp.path(), "python").await.unwrap();
        failed.set("stack", "ubuntu-22");
        failed.flush_failure("hook-failure").await.unwrap();

        let reopened = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert_eq!(reopened.get("python_version_full"), Some("3.12.7"));
        assert_eq!(reopened.get("package_manager"), Some("pip"));
        assert_eq!(reopened.get("stack"), Some("ubuntu-24"));
        assert_eq!(reopened.get("failure_reason"), Some("hook-failure"));
    }

    #[tokio::test]
    async fn success_after_failure_clears_the_reason() {
        let temp = TempDir::new().unwrap();

        let store = MetadataStore::open(temp.path(), "python").await.unwrap();
        store.flush_failure("download-failure").await.unwrap();

        let mut next = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert_eq!(next.get("failure_reason"), Some("download-failure"));
        next.set("stack", "ubuntu-24");
        next.flush().await.unwrap();

        let reopened = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert_eq!(reopened.get("failure_reason"), None);
    }

    #[tokio::test]
    async fn corrupt_record_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".molt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("python.json"), "not json at all").unwrap();

        let store = MetadataStore::open(temp.path(), "python").await.unwrap();
        assert!(store.get("stack").is_none());
    }

    #[tokio::test]
    async fn time_records_millis() {
        let temp = TempDir::new().unwrap();
        let mut store = MetadataStore::open(temp.path(), "python").await.unwrap();

        let start = Instant::now();
        store.time("time_version_resolved", start);

        let value: u128 = store.pending("time_version_resolved").unwrap().parse().unwrap();
        assert!(value < 60_000);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let temp = TempDir::new().unwrap();

        let mut python = MetadataStore::open(temp.path(), "python").await.unwrap();
        python.set("stack", "ubuntu-24");
        python.flush().await.unwrap();

        let node = MetadataStore::open(temp.path(), "nodejs").await.unwrap();
        assert!(node.get("stack").is_none());
    }
}
