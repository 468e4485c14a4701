//! Last-writer-wins merge of two sync documents.
//!
//! - Records are matched by `id`; the side with the later `updatedAt` wins
//!   field-by-field, fields only the older side has survive
//! - `usageCount` takes the max of both sides, never the sum
//! - `lastUsed` and `updatedAt` take the later instant
//! - Settings prefer the local side for every shared key
//!
//! Everything here is pure: no I/O, no failure paths.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::models::{
    now_iso, parse_timestamp, Record, SyncDocument, DEFAULT_VERSION, LAST_USED_FIELD,
    UPDATED_AT_FIELD, USAGE_COUNT_FIELD,
};

/// Merge `incoming` into `local`, producing a fresh document.
///
/// The result carries the local version (falling back to the incoming one,
/// then `1.0.0`) and a provenance stamp of the current time.
pub fn merge_documents(local: &SyncDocument, incoming: &SyncDocument) -> SyncDocument {
    let now = now_iso();

    let version = local
        .version
        .clone()
        .or_else(|| incoming.version.clone())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    // Keep whichever stamp fields the documents use; exportDate when neither says
    let stamp_last_modified = local.last_modified.is_some() || incoming.last_modified.is_some();
    let stamp_export_date =
        local.export_date.is_some() || incoming.export_date.is_some() || !stamp_last_modified;

    SyncDocument {
        version: Some(version),
        export_date: stamp_export_date.then(|| now.clone()),
        last_modified: stamp_last_modified.then_some(now),
        prompts: merge_collection(&local.prompts, &incoming.prompts),
        categories: merge_collection(&local.categories, &incoming.categories),
        settings: merge_settings(&local.settings, &incoming.settings),
        sync_metadata: local
            .sync_metadata
            .clone()
            .or_else(|| incoming.sync_metadata.clone()),
        extra: merge_settings(&local.extra, &incoming.extra),
    }
}

/// Merge two record collections keyed by `id`.
///
/// Local records keep their positions (conflicts resolved in place), records
/// only the incoming side has are appended in incoming order. Records with no
/// usable id never match anything and are carried through as-is.
pub fn merge_collection(local: &[Record], incoming: &[Record]) -> Vec<Record> {
    let mut merged: Vec<Record> = Vec::with_capacity(local.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in local {
        match record.key() {
            Some(key) => match index.get(&key) {
                Some(&pos) => merged[pos] = record.clone(),
                None => {
                    index.insert(key, merged.len());
                    merged.push(record.clone());
                }
            },
            None => merged.push(record.clone()),
        }
    }

    for record in incoming {
        match record.key() {
            Some(key) => match index.get(&key) {
                Some(&pos) => {
                    let resolved = merge_records(&merged[pos], record);
                    merged[pos] = resolved;
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(record.clone());
                }
            },
            None => merged.push(record.clone()),
        }
    }

    merged
}

/// Resolve two versions of the same record.
///
/// A missing or unparsable `updatedAt` is older than any real one; on an
/// exact tie the incoming record counts as newer.
pub fn merge_records(local: &Record, incoming: &Record) -> Record {
    let incoming_newer = incoming.updated_at() >= local.updated_at();
    let (older, newer) = if incoming_newer {
        (local, incoming)
    } else {
        (incoming, local)
    };

    let mut merged = older.clone();
    for (field, value) in newer.fields() {
        merged.insert(field.clone(), value.clone());
    }

    if let Some(count) = max_usage_count(local, incoming) {
        merged.insert(USAGE_COUNT_FIELD, count);
    }
    for field in [LAST_USED_FIELD, UPDATED_AT_FIELD] {
        match later_timestamp(local, incoming, field) {
            Some(value) => {
                merged.insert(field, value);
            }
            None => {
                merged.remove(field);
            }
        }
    }

    merged
}

/// Shallow merge where local values win for shared keys
pub fn merge_settings(
    local: &Map<String, Value>,
    incoming: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = incoming.clone();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// `max(local or 0, incoming or 0)`, keeping the original JSON number.
/// `None` when neither side has a numeric count.
fn max_usage_count(local: &Record, incoming: &Record) -> Option<Value> {
    let (l, i) = (local.usage_count(), incoming.usage_count());
    if l.is_none() && i.is_none() {
        return None;
    }

    let best = l.unwrap_or(0.0).max(i.unwrap_or(0.0));
    [local, incoming]
        .into_iter()
        .find(|record| record.usage_count() == Some(best))
        .and_then(|record| record.get(USAGE_COUNT_FIELD).cloned())
        .or_else(|| Some(Value::from(0)))
}

/// The later of the two sides' values for `field`.
/// Equal instants keep local; if neither parses, local's raw value is kept
/// (`None` when local has no value, so the field is dropped).
fn later_timestamp(local: &Record, incoming: &Record, field: &str) -> Option<Value> {
    let l = parse_timestamp(local.get(field));
    let i = parse_timestamp(incoming.get(field));

    if i > l {
        incoming.get(field).cloned()
    } else {
        local.get(field).cloned()
    }
}
