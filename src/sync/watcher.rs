//! File System Watcher
//!
//! Watches a single file for changes using the `notify` crate.
//! Debounces events so a burst of writes triggers one sync.
//!
//! The watch itself sits behind [`FileWatcher`] so the daemon and the
//! native host can run against any event source.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Default debounce before a merge cycle starts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// File change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file was created
    Created(PathBuf),
    /// The file content changed
    Modified(PathBuf),
    /// Another file was renamed onto the watched path
    Renamed(PathBuf),
    /// The file was deleted or renamed away
    Removed(PathBuf),
    /// Watcher error
    Error(String),
}

impl WatchEvent {
    /// Whether this event means there may be new content to read
    pub fn triggers_sync(&self) -> bool {
        matches!(
            self,
            WatchEvent::Created(_) | WatchEvent::Modified(_) | WatchEvent::Renamed(_)
        )
    }
}

/// Callback invoked for every event on the watched path
pub type ChangeCallback = Box<dyn Fn(WatchEvent) + Send + Sync + 'static>;

/// Cancels a watch when dropped or when [`WatchHandle::cancel`] is called
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop watching
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Capability to watch one file path
pub trait FileWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<WatchHandle>;
}

/// Platform-native watcher (inotify, FSEvents/kqueue, ReadDirectoryChanges)
///
/// Watches the parent directory, so the file may be created, replaced by a
/// rename, or deleted and recreated without losing the watch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcher;

impl FileWatcher for NotifyWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<WatchHandle> {
        let target: OsString = path
            .file_name()
            .ok_or_else(|| SyncError::Config(format!("Not a file path: {}", path.display())))?
            .to_os_string();
        let dir = watch_dir(path);
        std::fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if let Some(change) = classify(&event, &target) {
                        on_change(change);
                    }
                }
                Err(e) => on_change(WatchEvent::Error(e.to_string())),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!("Watching {} (via {})", path.display(), dir.display());

        Ok(WatchHandle::new(move || drop(watcher)))
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Map a raw `notify` event to a change on `target`, if it concerns it
pub fn classify(event: &Event, target: &OsStr) -> Option<WatchEvent> {
    let is_target = |path: &PathBuf| path.file_name() == Some(target);
    let path = event
        .paths
        .iter()
        .find(|path| path.file_name() == Some(target))?
        .clone();

    match event.kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEvent::Removed(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.last().is_some_and(is_target) {
                Some(WatchEvent::Renamed(path))
            } else {
                Some(WatchEvent::Removed(path))
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEvent::Renamed(path)),
        EventKind::Modify(_) | EventKind::Any => Some(WatchEvent::Modified(path)),
        EventKind::Remove(_) => Some(WatchEvent::Removed(path)),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

/// Where the watch loop stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Nothing pending
    Idle,
    /// Waiting for events to settle
    Debouncing { deadline: Instant },
    /// A merge cycle is running
    Merging,
}

/// Single pending timer per watched path.
///
/// Every event pushes the deadline out; when it passes the caller runs
/// one cycle and reports back with [`Debouncer::finish`].
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    state: WatchState,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: WatchState::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// A relevant event arrived: (re)start the timer
    pub fn on_event(&mut self, now: Instant) {
        self.state = WatchState::Debouncing {
            deadline: now + self.delay,
        };
    }

    /// When the pending timer fires, if any
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WatchState::Debouncing { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Move to `Merging` if the timer has expired. Returns true when the
    /// caller should run a cycle now.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            WatchState::Debouncing { deadline } if now >= deadline => {
                self.state = WatchState::Merging;
                true
            }
            _ => false,
        }
    }

    /// The cycle is done. Events that arrived meanwhile keep their timer.
    pub fn finish(&mut self) {
        if self.state == WatchState::Merging {
            self.state = WatchState::Idle;
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
