use chrono::{Local, TimeZone};
use serde_json::{json, Map, Value};
use std::fs;
use tempfile::TempDir;

use vanguard_probe::core::models::{ProbeCategory, ProbeData, ProbeResult, ScanReport};
use vanguard_probe::core::store::{AnalysisStore, REPORT_FIELD};
use vanguard_probe::core::target::Target;
use vanguard_probe::error::StoreError;

fn sample_report() -> ScanReport {
    let mut report = ScanReport::new(Target::parse("https://example.com").unwrap());
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("Server".to_string(), "nginx".to_string());
    report.results.insert(
        ProbeCategory::Headers,
        ProbeResult::completed(ProbeCategory::Headers, ProbeData::Headers(headers), Vec::new()),
    );
    report
}

fn base_record() -> Map<String, Value> {
    let Value::Object(map) = json!({"title": "Example Domain", "links": ["/about"]}) else {
        unreachable!()
    };
    map
}

#[tokio::test]
async fn test_persist_keeps_unrelated_fields_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = AnalysisStore::new(dir.path());
    let path = store.create_record("example.com", base_record()).await.unwrap();
    let report = sample_report();

    store.persist(&path, &report).await.unwrap();
    let first = fs::read_to_string(&path).unwrap();
    store.persist(&path, &report).await.unwrap();
    let second = fs::read_to_string(&path).unwrap();
    assert_eq!(first, second);

    let record = store.load_record(&path).await.unwrap();
    assert_eq!(record["title"], "Example Domain");
    assert_eq!(record["domain"], "example.com");
    assert_eq!(record[REPORT_FIELD]["security_headers"]["data"]["Server"], "nginx");
}

#[tokio::test]
async fn test_persist_rejects_unparseable_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("example_com_20240101_000000.json");
    fs::write(&path, "{ not json").unwrap();

    let store = AnalysisStore::new(dir.path());
    let result = store.persist(&path, &sample_report()).await;

    assert!(matches!(result, Err(StoreError::Format { .. })));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_persist_rejects_missing_and_non_object_records() {
    let dir = TempDir::new().unwrap();
    let store = AnalysisStore::new(dir.path());

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        store.persist(&missing, &sample_report()).await,
        Err(StoreError::Io { .. })
    ));

    let array = dir.path().join("array.json");
    fs::write(&array, "[1, 2, 3]").unwrap();
    assert!(matches!(
        store.persist(&array, &sample_report()).await,
        Err(StoreError::NotAnObject(_))
    ));
}

#[tokio::test]
async fn test_latest_record_picks_newest_for_domain() {
    let dir = TempDir::new().unwrap();
    let store = AnalysisStore::new(dir.path());
    for name in [
        "example_com_20240101_080000.json",
        "example_com_20240302_120000.json",
        "example_com_evil_20250101_000000.json",
        "other_org_20260101_000000.json",
    ] {
        fs::write(dir.path().join(name), "{}").unwrap();
    }

    let latest = store.latest_record("example.com").await.unwrap();
    assert_eq!(latest, dir.path().join("example_com_20240302_120000.json"));

    assert!(matches!(
        store.latest_record("nobody.net").await,
        Err(StoreError::NoRecord(_))
    ));
}

#[tokio::test]
async fn test_concurrent_persists_leave_valid_json() {
    let dir = TempDir::new().unwrap();
    let store = AnalysisStore::new(dir.path());
    let path = store.create_record("example.com", Map::new()).await.unwrap();
    let report = sample_report();

    let writes = (0..8).map(|_| store.persist(&path, &report));
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    let record = store.load_record(&path).await.unwrap();
    assert!(record[REPORT_FIELD].is_object());
}

#[test]
fn test_record_path_layout() {
    let store = AnalysisStore::default();
    let at = Local.with_ymd_and_hms(2025, 11, 30, 23, 59, 1).unwrap();
    assert_eq!(
        store.record_path("example.com", at),
        std::path::PathBuf::from("history/example_com_20251130_235901.json")
    );
}
