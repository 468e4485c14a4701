//! Main Sync Daemon
//!
//! Watches the incoming sync file and runs one merge cycle per settled
//! burst of changes: read incoming, read local, merge, back up, write.
//! Runs on a single thread; a failed cycle is logged and the daemon goes
//! back to waiting.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::config::{SyncConfig, WriteMode};
use super::merge::merge_documents;
use super::store::{read_document, DocumentStore};
use super::watcher::{Debouncer, FileWatcher, WatchEvent};
use crate::error::Result;

/// Sync daemon events
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Daemon started
    Started,
    /// File change detected
    FileChanged { path: String },
    /// Merge cycle started
    SyncStarted,
    /// Merge cycle wrote the app-data file
    SyncCompleted {
        prompts: usize,
        categories: usize,
        duration_ms: u64,
    },
    /// Nothing to merge this cycle
    SyncSkipped,
    /// Merge cycle failed
    SyncFailed { error: String },
    /// Daemon stopped
    Stopped,
}

/// Statistics about merge cycles
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total cycles run
    pub total_cycles: u64,
    /// Cycles that wrote a merged document
    pub merged_cycles: u64,
    /// Cycles with no readable sync file
    pub skipped_cycles: u64,
    /// Failed cycles
    pub failed_cycles: u64,
    /// Last completed merge
    pub last_sync: Option<std::time::Instant>,
    /// Last error
    pub last_error: Option<String>,
    /// Average merge duration in ms
    pub avg_sync_duration_ms: f64,
}

/// Result of one merge cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Merged document written
    Merged { prompts: usize, categories: usize },
    /// Sync file absent or unreadable
    Skipped,
    /// Cycle aborted
    Failed(String),
}

/// The sync-file watcher daemon
pub struct SyncDaemon {
    /// Configuration
    config: SyncConfig,

    /// App-data document
    store: DocumentStore,

    /// Statistics
    stats: SyncStats,

    /// Event callback
    event_callback: Option<Box<dyn Fn(SyncEvent) + Send + Sync>>,
}

impl SyncDaemon {
    pub fn new(config: SyncConfig) -> Self {
        let store = config.app_data_store();
        Self {
            config,
            store,
            stats: SyncStats::default(),
            event_callback: None,
        }
    }

    /// Set event callback
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: Fn(SyncEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get current stats
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Run one merge cycle. Never fails; errors are logged and counted.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let start = std::time::Instant::now();
        self.emit_event(SyncEvent::SyncStarted);
        self.stats.total_cycles += 1;

        let outcome = match self.try_cycle() {
            Ok(outcome) => outcome,
            Err(e) => CycleOutcome::Failed(e.to_string()),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            CycleOutcome::Merged {
                prompts,
                categories,
            } => {
                info!(
                    "Merged {} into {} ({} prompts, {} categories, {} ms)",
                    self.config.watch_file.display(),
                    self.config.app_data_file.display(),
                    prompts,
                    categories,
                    duration_ms
                );
                self.stats.merged_cycles += 1;
                self.stats.last_sync = Some(std::time::Instant::now());

                // Update rolling average
                let n = self.stats.merged_cycles as f64;
                self.stats.avg_sync_duration_ms =
                    (self.stats.avg_sync_duration_ms * (n - 1.0) + duration_ms as f64) / n;

                self.emit_event(SyncEvent::SyncCompleted {
                    prompts: *prompts,
                    categories: *categories,
                    duration_ms,
                });
            }
            CycleOutcome::Skipped => {
                info!(
                    "No readable sync file at {}, skipping",
                    self.config.watch_file.display()
                );
                self.stats.skipped_cycles += 1;
                self.emit_event(SyncEvent::SyncSkipped);
            }
            CycleOutcome::Failed(message) => {
                error!("Merge cycle failed: {}", message);
                self.stats.failed_cycles += 1;
                self.stats.last_error = Some(message.clone());
                self.emit_event(SyncEvent::SyncFailed {
                    error: message.clone(),
                });
            }
        }

        outcome
    }

    fn try_cycle(&self) -> Result<CycleOutcome> {
        let Some(incoming) = read_document(&self.config.watch_file)? else {
            return Ok(CycleOutcome::Skipped);
        };
        let local = self.store.read()?.unwrap_or_default();

        let merged = merge_documents(&local, &incoming);
        match self.config.mode {
            WriteMode::Full => self.store.write(&merged)?,
            WriteMode::Prompts => self.store.write(&merged.prompts)?,
        }

        Ok(CycleOutcome::Merged {
            prompts: merged.prompts.len(),
            categories: merged.categories.len(),
        })
    }

    /// Watch the sync file until `shutdown` resolves.
    ///
    /// If the sync file already exists, one cycle runs before waiting for
    /// events so a file dropped while offline is not missed.
    pub async fn run<W, F>(&mut self, watcher: &W, shutdown: F) -> Result<()>
    where
        W: FileWatcher + ?Sized,
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watcher.watch(
            &self.config.watch_file,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        )?;

        info!(
            "Watching {} (mode {:?}, debounce {} ms)",
            self.config.watch_file.display(),
            self.config.mode,
            self.config.debounce_ms
        );
        self.emit_event(SyncEvent::Started);

        if self.config.watch_file.exists() {
            debug!("Sync file present at startup");
            self.run_cycle();
        }

        let mut debouncer = Debouncer::new(self.config.debounce_duration());
        tokio::pin!(shutdown);

        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down sync watcher");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.handle_watch_event(event, &mut debouncer),
                    None => {
                        warn!("File watch closed, stopping");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    if debouncer.poll(Instant::now()) {
                        self.run_cycle();
                        debouncer.finish();
                    }
                }
            }
        }

        handle.cancel();
        self.emit_event(SyncEvent::Stopped);
        Ok(())
    }

    fn handle_watch_event(&mut self, event: WatchEvent, debouncer: &mut Debouncer) {
        match event {
            WatchEvent::Error(e) => warn!("Watcher error: {}", e),
            event if event.triggers_sync() => {
                if let WatchEvent::Created(path)
                | WatchEvent::Modified(path)
                | WatchEvent::Renamed(path) = &event
                {
                    debug!("Change detected: {:?}", event);
                    self.emit_event(SyncEvent::FileChanged {
                        path: path.display().to_string(),
                    });
                }
                debouncer.on_event(Instant::now());
            }
            event => debug!("Ignoring {:?}", event),
        }
    }

    /// Emit an event
    fn emit_event(&self, event: SyncEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}
