//! End-to-end hot reload against a real file on disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use convoy_core::{
    Pool, PoolStore, RotationCursor, Session, SessionRotator, SessionSource, Settings,
};
use convoy_runtime::{
    ConfigLoader, DEBOUNCE_WINDOW, DEFINITIONS_FILE_NAME, PoolReloader, watch_definitions,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn definitions_json(keys: &[&str]) -> String {
    let entries: Vec<String> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| format!(r#"{{"id":{},"key":"{key}"}}"#, i + 1))
        .collect();
    format!(r#"{{"sessionKeys":[{}]}}"#, entries.join(","))
}

fn write_keys(path: &Path, keys: &[&str]) {
    std::fs::write(path, definitions_json(keys)).unwrap();
}

async fn wait_for_count(store: &PoolStore, expected: usize) -> bool {
    for _ in 0..100 {
        if store.session_count() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_definitions_file_change_reloads_pool() {
    let work = TempDir::new().unwrap();
    let data = work.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    let path = data.join(DEFINITIONS_FILE_NAME);
    write_keys(&path, &["k1", "k2"]);

    let loaded = ConfigLoader::new(HashMap::new())
        .with_work_dir(work.path())
        .load();
    let watch_path = loaded.source.watch_path().cloned().unwrap();
    assert!(matches!(loaded.source, SessionSource::DefinitionsFile(_)));

    let store = Arc::new(PoolStore::new(loaded.pool));
    let rotator = Arc::new(SessionRotator::new(Arc::clone(&store)));
    rotator.next_with_retry().unwrap();

    let handle = watch_definitions(
        PoolReloader::new(watch_path, Arc::clone(&rotator)),
        DEBOUNCE_WINDOW,
        CancellationToken::new(),
    )
    .unwrap();

    write_keys(&path, &["n1", "n2", "n3", "n4", "n5", "n6"]);

    assert!(wait_for_count(&store, 6).await, "pool was not reloaded");
    assert_eq!(store.max_retry(), 5);
    assert_eq!(rotator.cursor(), RotationCursor::default());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_rename_into_place_is_seen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(DEFINITIONS_FILE_NAME);
    write_keys(&path, &["k1"]);

    let store = Arc::new(PoolStore::new(Pool::new(
        vec![Session::new("k1")],
        Settings::default(),
    )));
    let rotator = Arc::new(SessionRotator::new(Arc::clone(&store)));
    let handle = watch_definitions(
        PoolReloader::new(&path, rotator),
        DEBOUNCE_WINDOW,
        CancellationToken::new(),
    )
    .unwrap();

    let staging = dir.path().join("sessionKeys.json.tmp");
    write_keys(&staging, &["r1", "r2", "r3"]);
    std::fs::rename(&staging, &path).unwrap();

    assert!(wait_for_count(&store, 3).await, "rename was not picked up");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_broken_write_keeps_previous_pool() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(DEFINITIONS_FILE_NAME);
    write_keys(&path, &["k1", "k2"]);

    let store = Arc::new(PoolStore::new(Pool::new(
        vec![Session::new("k1"), Session::new("k2")],
        Settings::default(),
    )));
    let rotator = Arc::new(SessionRotator::new(Arc::clone(&store)));
    let handle = watch_definitions(
        PoolReloader::new(&path, rotator),
        DEBOUNCE_WINDOW,
        CancellationToken::new(),
    )
    .unwrap();

    std::fs::write(&path, "{ truncated").unwrap();
    tokio::time::sleep(DEBOUNCE_WINDOW * 3).await;
    assert_eq!(store.session_count(), 2);

    // A later valid write still goes through.
    write_keys(&path, &["k1"]);
    assert!(wait_for_count(&store, 1).await, "pool was not reloaded");

    handle.shutdown().await;
}
