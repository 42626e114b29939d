// src/core/store.rs

//! The JSON-backed site-analysis history.
//!
//! A record is one pretty-printed JSON object per domain and capture time,
//! stored as `<root>/<domain>_<%Y%m%d_%H%M%S>.json`. Scan reports are merged
//! into the `vapt_results` field; every other field belongs to whoever created
//! the record and is left alone.

use chrono::{DateTime, Local, NaiveDateTime};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info};

use crate::core::models::ScanReport;
use crate::error::StoreError;

/// The record field that holds the scan report.
pub const REPORT_FIELD: &str = "vapt_results";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One async lock per record path, so read-modify-write cycles on the same
/// file never interleave inside this process.
static PATH_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The lock table key for `path`: its canonical parent joined with the file
/// name, so `dir/x.json` and `dir/./x.json` share a lock. Falls back to the
/// path as given when the parent cannot be resolved.
async fn lock_key(path: &Path) -> PathBuf {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
    match fs::canonicalize(parent).await {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}

async fn lock_for(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let key = lock_key(path).await;
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Drop locks nobody holds or waits on.
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    Arc::clone(locks.entry(key).or_default())
}

/// Replaces the report section of `record` and leaves every other field as
/// it was.
pub fn merge(mut record: Map<String, Value>, report: &ScanReport) -> Map<String, Value> {
    record.insert(REPORT_FIELD.to_string(), report.to_record());
    record
}

/// `example.com:8443` becomes `example_com_8443`.
pub fn sanitize_domain(domain: &str) -> String {
    domain.replace(['.', ':'], "_")
}

#[derive(Debug, Clone)]
pub struct AnalysisStore {
    root: PathBuf,
}

impl Default for AnalysisStore {
    fn default() -> Self {
        Self::new("history")
    }
}

impl AnalysisStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, domain: &str, at: DateTime<Local>) -> PathBuf {
        self.root
            .join(format!("{}_{}.json", sanitize_domain(domain), at.format(TIMESTAMP_FORMAT)))
    }

    /// Writes a fresh record for `domain` stamped with the current local time
    /// and returns its path.
    pub async fn create_record(&self, domain: &str, base: Map<String, Value>) -> Result<PathBuf, StoreError> {
        let now = Local::now();
        let path = self.record_path(domain, now);
        let mut record = base;
        record.insert("domain".to_string(), Value::String(domain.to_string()));
        record.insert(
            "timestamp".to_string(),
            Value::String(now.format("%Y-%m-%d %H:%M:%S").to_string()),
        );

        fs::create_dir_all(&self.root).await.map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let lock = lock_for(&path).await;
        let _guard = lock.lock().await;
        write_atomic(&path, &record).await?;
        info!(path = %path.display(), "Created analysis record.");
        Ok(path)
    }

    /// The most recent record stored for `domain`, by the timestamp in its
    /// file name.
    pub async fn latest_record(&self, domain: &str) -> Result<PathBuf, StoreError> {
        let prefix = format!("{}_", sanitize_domain(domain));
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NoRecord(domain.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path: self.root.clone(), source }),
        };

        let mut latest: Option<(NaiveDateTime, PathBuf)> = None;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(StoreError::Io { path: self.root.clone(), source }),
            };
            let file_name = entry.file_name();
            let Some(stamp) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            // A longer domain sharing the prefix leaves a non-timestamp remainder.
            let Ok(at) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) else {
                continue;
            };
            if latest.as_ref().is_none_or(|(best, _)| at > *best) {
                latest = Some((at, entry.path()));
            }
        }

        latest
            .map(|(_, path)| path)
            .ok_or_else(|| StoreError::NoRecord(domain.to_string()))
    }

    /// Reads a record and checks that it is a JSON object.
    pub async fn load_record(&self, path: &Path) -> Result<Map<String, Value>, StoreError> {
        read_record(path).await
    }

    /// Merges `report` into the record at `path` and writes it back.
    ///
    /// The record must already exist. Any read, parse or write failure is
    /// returned and the file is left as it was.
    pub async fn persist(&self, path: &Path, report: &ScanReport) -> Result<(), StoreError> {
        let lock = lock_for(path).await;
        let _guard = lock.lock().await;

        let record = read_record(path).await?;
        let updated = merge(record, report);
        write_atomic(path, &updated).await?;
        info!(path = %path.display(), "Scan results appended to analysis record.");
        Ok(())
    }
}

async fn read_record(path: &Path) -> Result<Map<String, Value>, StoreError> {
    let content = fs::read_to_string(path).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(StoreError::NotAnObject(path.to_path_buf())),
        Err(source) => Err(StoreError::Format { path: path.to_path_buf(), source }),
    }
}

async fn write_atomic(path: &Path, record: &Map<String, Value>) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(record).map_err(|source| StoreError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    debug!(tmp = %tmp.display(), "Writing record to temporary file.");
    fs::write(&tmp, content)
        .await
        .map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
    if let Err(source) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::Io { path: path.to_path_buf(), source });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_path_uses_sanitized_domain_and_local_time() {
        let store = AnalysisStore::new("history");
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            store.record_path("shop.example.com:8443", at),
            PathBuf::from("history/shop_example_com_8443_20240309_140507.json")
        );
    }

    #[test]
    fn merge_only_touches_report_field() {
        let mut record = Map::new();
        record.insert("domain".to_string(), Value::String("example.com".to_string()));
        record.insert(REPORT_FIELD.to_string(), Value::String("stale".to_string()));

        let target = crate::core::target::Target::parse("https://example.com").unwrap();
        let merged = merge(record, &ScanReport::new(target));

        assert_eq!(merged["domain"], "example.com");
        assert!(merged[REPORT_FIELD].is_object());
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn equivalent_paths_share_one_lock() {
        let dir = tempfile::TempDir::new().unwrap();
        let plain = dir.path().join("example_com_20240101_000000.json");
        let dotted = dir.path().join(".").join("example_com_20240101_000000.json");
        assert_eq!(lock_key(&plain).await, lock_key(&dotted).await);

        let held = lock_for(&plain).await;
        let again = lock_for(&dotted).await;
        assert!(Arc::ptr_eq(&held, &again));
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pruned.json");
        let key = lock_key(&path).await;

        drop(lock_for(&path).await);
        // Any later lookup sweeps unused entries.
        let _other = lock_for(&dir.path().join("other.json")).await;

        let locks = PATH_LOCKS.lock().unwrap();
        assert!(!locks.contains_key(&key));
    }
}
