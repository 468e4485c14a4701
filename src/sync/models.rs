//! Data models for the synchronized prompt document.
//!
//! Documents arrive from other processes (browser extension, other devices)
//! and may be partial. Everything here is lenient: wrong types become
//! defaults instead of errors so a merge always has two complete sides.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Schema version assumed when a document does not carry one
pub const DEFAULT_VERSION: &str = "1.0.0";

pub const ID_FIELD: &str = "id";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const USAGE_COUNT_FIELD: &str = "usageCount";
pub const LAST_USED_FIELD: &str = "lastUsed";

/// Current time as an ISO-8601 string (`2024-01-01T00:00:00.000Z`)
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp field into an instant.
///
/// Accepts RFC 3339 strings, zone-less date-times (read as UTC), bare dates,
/// and integer epoch milliseconds. Anything else is `None`, which orders
/// before every real instant.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A single entry in `prompts` or `categories`.
///
/// Only `id`, `updatedAt`, `usageCount` and `lastUsed` have meaning to the
/// merge; every other field is opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Identity used to match records across documents.
    ///
    /// Numeric ids are matched by their decimal form.
    pub fn key(&self) -> Option<String> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.get(UPDATED_AT_FIELD))
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.get(LAST_USED_FIELD))
    }

    /// `usageCount` if it is a number
    pub fn usage_count(&self) -> Option<f64> {
        self.get(USAGE_COUNT_FIELD).and_then(Value::as_f64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Provenance block attached by native messaging peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Producing side, e.g. `desktop` or `extension`
    pub source: String,
    /// Opaque content hash supplied by the producer
    pub checksum: String,
}

/// The unit of synchronization
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    pub prompts: Vec<Record>,

    pub categories: Vec<Record>,

    pub settings: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_metadata: Option<SyncMetadata>,

    /// Top-level fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncDocument {
    /// Build a document from arbitrary JSON.
    ///
    /// Objects are read leniently. A bare array is a prompts-only document
    /// (the shape written in prompts mode). Any other JSON value is not a
    /// document and yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(Self::from_object(obj)),
            Value::Array(items) => Some(Self {
                prompts: records_from(items, "prompts"),
                ..Self::default()
            }),
            _ => None,
        }
    }

    fn from_object(mut obj: Map<String, Value>) -> Self {
        let prompts = take_records(&mut obj, "prompts");
        let categories = take_records(&mut obj, "categories");
        let settings = match obj.remove("settings") {
            Some(Value::Object(settings)) => settings,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                warn!("Ignoring non-object settings ({})", json_kind(&other));
                Map::new()
            }
        };
        let version = take_string(&mut obj, "version");
        let export_date = take_string(&mut obj, "exportDate");
        let last_modified = take_string(&mut obj, "lastModified");
        let sync_metadata = obj
            .remove("syncMetadata")
            .and_then(|meta| serde_json::from_value(meta).ok());

        Self {
            version,
            export_date,
            last_modified,
            prompts,
            categories,
            settings,
            sync_metadata,
            extra: obj,
        }
    }

    /// Fill in every defaultable field
    pub fn normalize(mut self) -> Self {
        self.version.get_or_insert_with(|| DEFAULT_VERSION.to_string());
        if self.export_date.is_none() && self.last_modified.is_none() {
            self.export_date = Some(now_iso());
        }
        self
    }

    /// Schema version, defaulted
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty() && self.categories.is_empty() && self.settings.is_empty()
    }
}

fn take_string(obj: &mut Map<String, Value>, field: &str) -> Option<String> {
    match obj.remove(field)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn take_records(obj: &mut Map<String, Value>, field: &str) -> Vec<Record> {
    match obj.remove(field) {
        Some(Value::Array(items)) => records_from(items, field),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring non-array {} ({})", field, json_kind(&other));
            Vec::new()
        }
    }
}

fn records_from(items: Vec<Value>, field: &str) -> Vec<Record> {
    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => Some(Record(fields)),
            _ => None,
        })
        .collect();

    if records.len() < total {
        warn!(
            "Dropped {} non-object entries from {}",
            total - records.len(),
            field
        );
    }
    records
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
