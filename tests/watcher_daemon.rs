//! Sync daemon driven through a scripted watcher on a paused clock

mod common;

use common::{read_json, write_json, ManualWatcher};
use prompt_sync::sync::{SyncEvent, WatchEvent};
use prompt_sync::{SyncConfig, SyncDaemon, WriteMode};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn config(dir: &std::path::Path) -> SyncConfig {
    SyncConfig::new(dir.join("incoming.json"), dir.join("app.json"))
        .with_debounce(Duration::from_millis(400))
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_runs_one_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let watch_file = config.watch_file.clone();
    let mut daemon = SyncDaemon::new(config);
    let watcher = ManualWatcher::new();

    let script = async {
        write_json(&watch_file, &json!({"prompts": [{"id": "a"}]}));
        watcher.fire(WatchEvent::Created(watch_file.clone()));
        sleep(Duration::from_millis(100)).await;
        watcher.fire(WatchEvent::Modified(watch_file.clone()));
        sleep(Duration::from_millis(1_000)).await;
    };
    daemon.run(&watcher, script).await.unwrap();

    assert_eq!(daemon.stats().total_cycles, 1);
    assert_eq!(daemon.stats().merged_cycles, 1);
    assert_eq!(read_json(&dir.path().join("app.json"))["prompts"], json!([{"id": "a"}]));
    assert!(!watcher.is_watching());
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_run_separate_merges() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let watch_file = config.watch_file.clone();
    let mut daemon = SyncDaemon::new(config);
    let watcher = ManualWatcher::new();

    let script = async {
        write_json(&watch_file, &json!({"prompts": [{"id": "a"}]}));
        watcher.touch();
        sleep(Duration::from_millis(1_000)).await;
        write_json(&watch_file, &json!({"prompts": [{"id": "b"}]}));
        watcher.touch();
        sleep(Duration::from_millis(1_000)).await;
    };
    daemon.run(&watcher, script).await.unwrap();

    assert_eq!(daemon.stats().merged_cycles, 2);
    assert_eq!(
        read_json(&dir.path().join("app.json"))["prompts"],
        json!([{"id": "a"}, {"id": "b"}])
    );
}

#[tokio::test(start_paused = true)]
async fn existing_sync_file_is_merged_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_json(&config.watch_file, &json!({"categories": [{"id": "c1"}]}));
    let mut daemon = SyncDaemon::new(config);
    let watcher = ManualWatcher::new();

    daemon.run(&watcher, async {}).await.unwrap();

    assert_eq!(daemon.stats().merged_cycles, 1);
    let written = read_json(&dir.path().join("app.json"));
    assert_eq!(written["categories"], json!([{"id": "c1"}]));
    assert_eq!(written["version"], json!("1.0.0"));
}

#[tokio::test(start_paused = true)]
async fn removal_does_not_trigger_a_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let watch_file = config.watch_file.clone();
    let mut daemon = SyncDaemon::new(config);
    let watcher = ManualWatcher::new();

    let script = async {
        watcher.fire(WatchEvent::Removed(watch_file.clone()));
        watcher.fire(WatchEvent::Error("inotify overflow".to_string()));
        sleep(Duration::from_millis(1_000)).await;
    };
    daemon.run(&watcher, script).await.unwrap();

    assert_eq!(daemon.stats().total_cycles, 0);
}

#[tokio::test(start_paused = true)]
async fn events_are_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let watch_file = config.watch_file.clone();
    let mut daemon = SyncDaemon::new(config);
    let watcher = ManualWatcher::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    daemon.on_event(move |event| sink.lock().unwrap().push(event));

    let script = async {
        write_json(&watch_file, &json!({}));
        watcher.touch();
        sleep(Duration::from_millis(1_000)).await;
    };
    daemon.run(&watcher, script).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&SyncEvent::Started));
    assert!(matches!(seen[1], SyncEvent::FileChanged { .. }));
    assert_eq!(seen[2], SyncEvent::SyncStarted);
    assert!(matches!(seen[3], SyncEvent::SyncCompleted { .. }));
    assert_eq!(seen.last(), Some(&SyncEvent::Stopped));
}

#[test]
fn prompts_mode_writes_a_bare_array() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_mode(WriteMode::Prompts);
    write_json(
        &config.watch_file,
        &json!({
            "prompts": [{"id": "p2"}, {"id": "p3"}],
            "categories": [{"id": "c1"}]
        }),
    );
    write_json(&config.app_data_file, &json!({"prompts": [{"id": "p1"}]}));

    let mut daemon = SyncDaemon::new(config);
    daemon.run_cycle();

    let written = read_json(&dir.path().join("app.json"));
    assert_eq!(written, json!([{"id": "p1"}, {"id": "p2"}, {"id": "p3"}]));

    // a second cycle reads the bare array back as the local prompts
    daemon.run_cycle();
    let written = read_json(&dir.path().join("app.json"));
    assert_eq!(written, json!([{"id": "p1"}, {"id": "p2"}, {"id": "p3"}]));
}

#[test]
fn every_write_leaves_a_backup_of_the_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_json(&config.watch_file, &json!({"prompts": [{"id": "new"}]}));
    write_json(&config.app_data_file, &json!({"prompts": [{"id": "old"}]}));

    let mut daemon = SyncDaemon::new(config);
    daemon.run_cycle();
    daemon.run_cycle();

    let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 2);

    let originals = backups
        .iter()
        .filter(|path| read_json(path) == json!({"prompts": [{"id": "old"}]}))
        .count();
    assert_eq!(originals, 1);
}
