//! Prompt Sync - cross-device merge engine for the prompt library
//!
//! Provides the document model, last-write-wins merge, backup-rotating
//! persistence, the sync-file watcher daemon, and the browser native
//! messaging host.

pub mod error;
pub mod host;
pub mod signal;
pub mod sync;

// Re-export commonly used types
pub use error::{Result, SyncError};
pub use host::{HostConfig, NativeHost};
pub use signal::shutdown_signal;
pub use sync::{
    merge_documents, DocumentStore, Record, RetentionPolicy, SyncConfig, SyncDaemon, SyncDocument,
    WriteMode,
};
