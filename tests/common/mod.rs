//! Shared test helpers

#![allow(dead_code)]

use prompt_sync::sync::{ChangeCallback, FileWatcher, WatchEvent, WatchHandle};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Watcher driven by the test instead of the file system
#[derive(Default)]
pub struct ManualWatcher {
    callback: Arc<Mutex<Option<ChangeCallback>>>,
    path: Mutex<Option<PathBuf>>,
}

impl ManualWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event as if the file system produced it
    pub fn fire(&self, event: WatchEvent) {
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(event);
        }
    }

    /// Deliver a modification of the watched path
    pub fn touch(&self) {
        let path = self.path.lock().unwrap().clone().expect("nothing watched");
        self.fire(WatchEvent::Modified(path));
    }

    pub fn is_watching(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    pub fn watched_path(&self) -> Option<PathBuf> {
        self.path.lock().unwrap().clone()
    }
}

impl FileWatcher for ManualWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> prompt_sync::Result<WatchHandle> {
        *self.callback.lock().unwrap() = Some(on_change);
        *self.path.lock().unwrap() = Some(path.to_path_buf());

        let slot = Arc::clone(&self.callback);
        Ok(WatchHandle::new(move || {
            slot.lock().unwrap().take();
        }))
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}
