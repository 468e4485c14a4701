//! Native host event loop over in-memory streams

mod common;

use common::{read_json, write_json, ManualWatcher};
use prompt_sync::host::{self, HostConfig, NativeHost};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::time::sleep;

fn document(source: &str, checksum: &str) -> Value {
    json!({
        "version": "1.0.0",
        "lastModified": "2024-01-01T00:00:00Z",
        "prompts": [],
        "categories": [],
        "settings": {},
        "syncMetadata": {"source": source, "checksum": checksum}
    })
}

fn output_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8(output.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn input(messages: &[Value]) -> String {
    messages
        .iter()
        .map(|m| format!("{}\n", m))
        .collect()
}

#[tokio::test]
async fn write_request_is_stored_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();
    let doc = document("ext", "abc");

    let requests = input(&[json!({"type": "writeSyncData", "id": "1", "data": doc})]);
    let mut output = Vec::new();
    host::run(
        &mut native_host,
        requests.as_bytes(),
        &mut output,
        &watcher,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(output_lines(&output), vec![json!({"id": "1", "data": {"success": true}})]);
    assert_eq!(read_json(&dir.path().join("sync-data.json")), doc);
    assert_eq!(native_host.last_checksum(), Some("abc"));
    assert!(!watcher.is_watching());
}

#[tokio::test]
async fn invalid_document_is_rejected_and_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync-data.json");
    let existing = document("desktop", "keep");
    write_json(&path, &existing);

    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();
    let mut bad = document("ext", "abc");
    bad["prompts"] = json!("not a list");

    let requests = input(&[json!({"type": "writeSyncData", "id": "9", "data": bad})]);
    let mut output = Vec::new();
    host::run(
        &mut native_host,
        requests.as_bytes(),
        &mut output,
        &watcher,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    let lines = output_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], json!("9"));
    assert!(lines[0]["error"].as_str().unwrap().contains("prompts"));
    assert!(lines[0].get("data").is_none());
    assert_eq!(read_json(&path), existing);
}

#[tokio::test]
async fn responses_follow_request_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();
    let doc = document("ext", "abc");

    let requests = input(&[
        json!({"type": "readSyncData", "id": "1"}),
        json!({"type": "getSyncStatus", "id": "2"}),
        json!({"type": "writeSyncData", "id": "3", "data": doc}),
        json!({"type": "manualSync", "id": "4"}),
        json!({"type": "readSyncData", "id": "5"}),
        json!({"type": "nope", "id": "6"}),
    ]);
    let mut output = Vec::new();
    host::run(
        &mut native_host,
        requests.as_bytes(),
        &mut output,
        &watcher,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    let lines = output_lines(&output);
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], json!({"id": "1", "data": null}));
    assert_eq!(lines[1], json!({"id": "2", "data": {"lastModified": null, "hasConflicts": false}}));
    assert_eq!(lines[2], json!({"id": "3", "data": {"success": true}}));
    assert_eq!(lines[3], json!({"type": "dataChanged", "data": doc}));
    assert_eq!(lines[4], json!({"id": "4", "data": {"success": true}}));
    assert_eq!(lines[5], json!({"id": "5", "data": doc}));
    assert_eq!(lines[6]["id"], json!("6"));
    assert!(lines[6]["error"].is_string());
}

#[tokio::test]
async fn unparsable_line_produces_error_push() {
    let dir = tempfile::tempdir().unwrap();
    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();

    let mut output = Vec::new();
    host::run(
        &mut native_host,
        "this is not json\n\n".as_bytes(),
        &mut output,
        &watcher,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    let lines = output_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["type"], json!("error"));
}

#[tokio::test(start_paused = true)]
async fn desktop_changes_are_pushed_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync-data.json");
    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();

    // keep the input open so only the script ends the loop
    let (client, server) = tokio::io::duplex(1024);
    let desktop = document("desktop", "d1");
    let extension = document("extension", "e1");

    let script = async {
        write_json(&path, &desktop);
        watcher.touch();
        sleep(Duration::from_millis(100)).await;
        watcher.touch();
        sleep(Duration::from_secs(1)).await;

        // same checksum again
        watcher.touch();
        sleep(Duration::from_secs(1)).await;

        // not from the desktop
        write_json(&path, &extension);
        watcher.touch();
        sleep(Duration::from_secs(1)).await;
    };

    let mut output = Vec::new();
    host::run(
        &mut native_host,
        BufReader::new(server),
        &mut output,
        &watcher,
        script,
    )
    .await
    .unwrap();
    drop(client);

    assert_eq!(
        output_lines(&output),
        vec![json!({"type": "dataChanged", "data": desktop})]
    );
    assert_eq!(watcher.watched_path(), Some(path));
}

#[tokio::test(start_paused = true)]
async fn own_writes_are_not_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let mut native_host = NativeHost::new(HostConfig::new(dir.path()));
    let watcher = ManualWatcher::new();

    let (mut client, server) = tokio::io::duplex(4096);
    let doc = document("desktop", "mine");
    let request = input(&[json!({"type": "writeSyncData", "id": "1", "data": doc})]);

    let script = async {
        client.write_all(request.as_bytes()).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        watcher.touch();
        sleep(Duration::from_secs(1)).await;
    };

    let mut output = Vec::new();
    host::run(
        &mut native_host,
        BufReader::new(server),
        &mut output,
        &watcher,
        script,
    )
    .await
    .unwrap();

    assert_eq!(
        output_lines(&output),
        vec![json!({"id": "1", "data": {"success": true}})]
    );
}
