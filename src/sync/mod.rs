//! Prompt Data Sync Module
//!
//! Watches an externally written sync file and merges it into the local
//! app-data document with per-field last-write-wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  SyncDaemon                       │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────┐ │
//! │  │ Watcher   │──▶│  Merge   │──▶│    Store     │ │
//! │  │ (notify + │   │ (pure    │   │ (backup then │ │
//! │  │ debounce) │   │  LWW)    │   │  write)      │ │
//! │  └───────────┘   └──────────┘   └──────────────┘ │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod merge;
pub mod models;
pub mod store;
pub mod watcher;

pub use config::{SyncConfig, WriteMode};
pub use daemon::{CycleOutcome, SyncDaemon, SyncEvent, SyncStats};
pub use merge::{merge_collection, merge_documents, merge_records, merge_settings};
pub use models::{Record, SyncDocument, SyncMetadata};
pub use store::{read_document, read_json, BackupRotation, DocumentStore, RetentionPolicy};
pub use watcher::{
    ChangeCallback, Debouncer, FileWatcher, NotifyWatcher, WatchEvent, WatchHandle, WatchState,
};
