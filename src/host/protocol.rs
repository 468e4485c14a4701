//! Native messaging wire format.
//!
//! One JSON object per line in each direction.
//!
//! ```json
//! {"type": "writeSyncData", "id": "1", "data": {...}}   // request
//! {"id": "1", "data": {"success": true}}                // response
//! {"id": "1", "error": "prompts must be an array"}      // failed request
//! {"type": "dataChanged", "data": {...}}                // push, no id
//! {"type": "error", "error": "..."}                     // push, no id
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SyncError};
use crate::sync::models::json_kind;

/// Raw inbound message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,

    /// Correlation id echoed back on the response (string or number)
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub data: Option<Value>,
}

impl InboundMessage {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| SyncError::Protocol(format!("Invalid message: {}", e)))
    }
}

/// How the peer wants a conflict settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Overwrite the document with the peer's local copy
    Local,
    /// Keep the document on disk
    Remote,
    /// Accepted, but no merge is performed
    Merge,
}

/// A decoded request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ReadSyncData,
    WriteSyncData(Value),
    GetSyncStatus,
    ManualSync,
    ResolveConflict {
        resolution: Resolution,
        local_data: Option<Value>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveConflictParams {
    resolution: Resolution,
    #[serde(default)]
    local_data: Option<Value>,
}

impl Request {
    pub fn from_message(message: &InboundMessage) -> Result<Self> {
        match message.kind.as_str() {
            "readSyncData" => Ok(Request::ReadSyncData),
            "writeSyncData" => message
                .data
                .clone()
                .map(Request::WriteSyncData)
                .ok_or_else(|| SyncError::Protocol("writeSyncData requires data".to_string())),
            "getSyncStatus" => Ok(Request::GetSyncStatus),
            "manualSync" => Ok(Request::ManualSync),
            "resolveConflict" => {
                let data = message.data.clone().ok_or_else(|| {
                    SyncError::Protocol("resolveConflict requires data".to_string())
                })?;
                let params: ResolveConflictParams = serde_json::from_value(data).map_err(|e| {
                    SyncError::Protocol(format!("Invalid resolveConflict data: {}", e))
                })?;
                Ok(Request::ResolveConflict {
                    resolution: params.resolution,
                    local_data: params.local_data,
                })
            }
            other => Err(SyncError::Protocol(format!("Unknown message type: {}", other))),
        }
    }
}

/// Unsolicited notification to the peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Push {
    DataChanged { data: Value },
    Error { error: String },
}

/// Anything written to the peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        data: Value,
    },
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        error: String,
    },
    Push(Push),
}

impl OutboundMessage {
    pub fn response(id: Option<Value>, data: Value) -> Self {
        OutboundMessage::Response { id, data }
    }

    pub fn failure(id: Option<Value>, error: impl Into<String>) -> Self {
        OutboundMessage::Failure {
            id,
            error: error.into(),
        }
    }

    /// `{"success": true}` acknowledgement
    pub fn success(id: Option<Value>) -> Self {
        Self::response(id, json!({ "success": true }))
    }

    /// One line of output, without the trailing newline
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Push> for OutboundMessage {
    fn from(push: Push) -> Self {
        OutboundMessage::Push(push)
    }
}

/// `getSyncStatus` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Modification time of the document file, `null` when absent
    pub last_modified: Option<String>,
    /// Conflict detection is not implemented; always false
    pub has_conflicts: bool,
}

/// Check the shape `writeSyncData` requires.
pub fn validate_sync_document(value: &Value) -> Result<()> {
    let obj = value.as_object().ok_or_else(|| {
        SyncError::Validation(format!("document must be an object, got {}", json_kind(value)))
    })?;

    let expect = |field: &str, ok: fn(&Value) -> bool, wanted: &str| -> Result<()> {
        match obj.get(field) {
            Some(v) if ok(v) => Ok(()),
            Some(v) => Err(SyncError::Validation(format!(
                "{} must be {}, got {}",
                field,
                wanted,
                json_kind(v)
            ))),
            None => Err(SyncError::Validation(format!("{} is missing", field))),
        }
    };

    expect("version", Value::is_string, "a string")?;
    expect("lastModified", Value::is_string, "a string")?;
    expect("prompts", Value::is_array, "an array")?;
    expect("categories", Value::is_array, "an array")?;
    expect("settings", Value::is_object, "an object")?;
    expect("syncMetadata", Value::is_object, "an object")?;

    let meta = &obj["syncMetadata"];
    for field in ["source", "checksum"] {
        match meta.get(field) {
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(SyncError::Validation(format!(
                    "syncMetadata.{} must be a string, got {}",
                    field,
                    json_kind(other)
                )))
            }
            None => {
                return Err(SyncError::Validation(format!(
                    "syncMetadata.{} is missing",
                    field
                )))
            }
        }
    }

    Ok(())
}
