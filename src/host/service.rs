//! Native messaging request handling.
//!
//! `NativeHost` owns the document path and the last checksum it saw, and
//! turns each inbound message into the messages to send back.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::config::HostConfig;
use super::protocol::{
    validate_sync_document, InboundMessage, OutboundMessage, Push, Request, Resolution,
    SyncStatus,
};
use crate::error::{Result, SyncError};
use crate::sync::store::DocumentStore;

/// Producer tag of documents written by the desktop app
pub const DESKTOP_SOURCE: &str = "desktop";

pub struct NativeHost {
    config: HostConfig,
    store: DocumentStore,
    document_path: PathBuf,
    /// Checksum of the last document written or announced
    last_checksum: Option<String>,
}

impl NativeHost {
    pub fn new(config: HostConfig) -> Self {
        let store = config.store();
        let document_path = config.document_path();
        Self {
            config,
            store,
            document_path,
            last_checksum: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn last_checksum(&self) -> Option<&str> {
        self.last_checksum.as_deref()
    }

    /// Handle one raw input line
    pub fn handle_line(&mut self, line: &str) -> Vec<OutboundMessage> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        match InboundMessage::parse(line) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                warn!("Rejected input line: {}", e);
                // still answer the request if it carried an id
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|value| value.get("id").cloned());
                match id {
                    Some(id) => vec![OutboundMessage::failure(Some(id), e.to_string())],
                    None => vec![Push::Error {
                        error: e.to_string(),
                    }
                    .into()],
                }
            }
        }
    }

    /// Handle one request, returning pushes (if any) followed by the response
    pub fn handle_message(&mut self, message: InboundMessage) -> Vec<OutboundMessage> {
        let id = message.id.clone();
        let request = match Request::from_message(&message) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected request: {}", e);
                return vec![OutboundMessage::failure(id, e.to_string())];
            }
        };
        debug!("Handling {}", message.kind);

        let mut out = Vec::new();
        let result = match request {
            Request::ReadSyncData => self.read_sync_data(),
            Request::WriteSyncData(data) => self.write_sync_data(data).map(|_| ack()),
            Request::GetSyncStatus => Ok(self.sync_status_value()),
            Request::ManualSync => self.manual_sync().map(|push| {
                out.extend(push.map(OutboundMessage::from));
                ack()
            }),
            Request::ResolveConflict {
                resolution,
                local_data,
            } => self.resolve_conflict(resolution, local_data).map(|_| ack()),
        };

        match result {
            Ok(data) => out.push(OutboundMessage::response(id, data)),
            Err(e) => {
                error!("{} failed: {}", message.kind, e);
                out.push(OutboundMessage::failure(id, e.to_string()));
            }
        }
        out
    }

    /// Current document, `null` if absent or not a valid sync document
    pub fn read_sync_data(&self) -> Result<Value> {
        Ok(self.read_valid_document()?.unwrap_or(Value::Null))
    }

    /// Stored document, `None` if absent, unparsable or not document-shaped
    fn read_valid_document(&self) -> Result<Option<Value>> {
        let Some(data) = self.store.read_raw()? else {
            return Ok(None);
        };
        match validate_sync_document(&data) {
            Ok(()) => Ok(Some(data)),
            Err(e) => {
                warn!("{} treated as absent: {}", self.document_path.display(), e);
                Ok(None)
            }
        }
    }

    /// Validate and persist a document from the peer
    pub fn write_sync_data(&mut self, data: Value) -> Result<()> {
        validate_sync_document(&data)?;
        self.store.write(&data)?;
        self.remember_checksum(&data);
        info!("Wrote sync document to {}", self.document_path.display());
        Ok(())
    }

    /// File modification time and conflict flag
    pub fn sync_status(&self) -> SyncStatus {
        let last_modified = match std::fs::metadata(&self.document_path).and_then(|m| m.modified()) {
            Ok(modified) => {
                Some(DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot stat {}: {}", self.document_path.display(), e);
                None
            }
        };

        SyncStatus {
            last_modified,
            has_conflicts: false,
        }
    }

    fn sync_status_value(&self) -> Value {
        serde_json::to_value(self.sync_status()).unwrap_or(Value::Null)
    }

    /// Announce the current document, if there is one
    pub fn manual_sync(&self) -> Result<Option<Push>> {
        Ok(self
            .read_valid_document()?
            .map(|data| Push::DataChanged { data }))
    }

    pub fn resolve_conflict(
        &mut self,
        resolution: Resolution,
        local_data: Option<Value>,
    ) -> Result<()> {
        match resolution {
            Resolution::Local => {
                let data = local_data.ok_or_else(|| {
                    SyncError::Protocol("resolution \"local\" requires localData".to_string())
                })?;
                self.store.write(&data)?;
                self.remember_checksum(&data);
                info!("Conflict resolved with local data");
            }
            Resolution::Remote => info!("Conflict resolved with remote data, nothing to write"),
            // TODO: field-level merge once conflicts are actually detected
            Resolution::Merge => warn!("Merge resolution is not implemented, document unchanged"),
        }
        Ok(())
    }

    /// React to a change of the document file.
    ///
    /// Only desktop-written documents with an unseen checksum are announced.
    pub fn on_document_changed(&mut self) -> Result<Option<Push>> {
        let Some(data) = self.store.read_raw()? else {
            return Ok(None);
        };

        let meta = data.get("syncMetadata");
        let source = meta.and_then(|m| m.get("source")).and_then(Value::as_str);
        let checksum = meta.and_then(|m| m.get("checksum")).and_then(Value::as_str);

        let checksum = match (source, checksum) {
            (Some(DESKTOP_SOURCE), Some(checksum)) => checksum.to_string(),
            _ => {
                debug!("Document change not from desktop, ignoring");
                return Ok(None);
            }
        };
        if self.last_checksum.as_deref() == Some(checksum.as_str()) {
            debug!("Checksum unchanged, ignoring");
            return Ok(None);
        }

        info!("Desktop changed the sync document, notifying peer");
        self.last_checksum = Some(checksum);
        Ok(Some(Push::DataChanged { data }))
    }

    fn remember_checksum(&mut self, data: &Value) {
        if let Some(checksum) = data
            .get("syncMetadata")
            .and_then(|m| m.get("checksum"))
            .and_then(Value::as_str)
        {
            self.last_checksum = Some(checksum.to_string());
        }
    }
}

fn ack() -> Value {
    serde_json::json!({ "success": true })
}
