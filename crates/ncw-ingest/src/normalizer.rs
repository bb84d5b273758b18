//! Raw upstream document -> canonical [`DeviceRecord`]s.
//!
//! The upstream "hydrated" document looks like
//! `{ "devices": { "cameras": { "<id>": { "device_id": "<id>", ... } } } }`.
//! `cameras` may also be an array.
//!
//! A broken camera entry is dropped and recorded in
//! [`NormalizedSnapshot::dropped`]; it never fails the batch. Only a document
//! that is not a snapshot at all returns `Err`.
//!
//! It does **not**:
//! - compare against previous state
//! - decide whether an event is new
//! - build the quality summary (that is `quality.rs`)

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use ncw_schemas::{DeviceRecord, EventRecord};
use serde_json::{Map, Value};

use crate::view::public_share;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Why a camera entry was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The entry was not a JSON object.
    NotAnObject,
    /// `device_id` missing, not a string, or blank.
    MissingDeviceId,
    /// An earlier entry in the same snapshot already used this id.
    DuplicateDeviceId(String),
}

impl DropReason {
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::NotAnObject => "not_an_object",
            DropReason::MissingDeviceId => "missing_device_id",
            DropReason::DuplicateDeviceId(_) => "duplicate_device_id",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotAnObject => write!(f, "camera entry is not an object"),
            DropReason::MissingDeviceId => write!(f, "camera entry has no device_id"),
            DropReason::DuplicateDeviceId(id) => {
                write!(f, "device_id '{id}' appears more than once")
            }
        }
    }
}

/// A dropped camera entry. `key` is the object key (or array index) it sat under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEntry {
    pub key: String,
    pub reason: DropReason,
}

/// A timestamp that was present but could not be parsed. The field is `None`
/// in the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampIssue {
    pub device_id: String,
    pub field: &'static str,
    pub raw: String,
}

/// Result of normalizing one snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSnapshot {
    /// Accepted records in snapshot order, unique by id, `has_new_event == false`.
    pub devices: Vec<DeviceRecord>,
    /// Number of camera entries in the document, accepted or not.
    pub total_entries: usize,
    pub dropped: Vec<DroppedEntry>,
    pub timestamp_issues: Vec<TimestampIssue>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Document-level failures. The whole payload is ignored; cached state stays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The payload is not a JSON object.
    NotAnObject,
    /// No `devices` object: not a device snapshot (e.g. a structure-only update).
    MissingDevices,
    /// `devices.cameras` is neither an object, an array nor null.
    InvalidCameras(String),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::NotAnObject => write!(f, "snapshot payload is not a JSON object"),
            NormalizeError::MissingDevices => {
                write!(f, "snapshot payload has no 'devices' object")
            }
            NormalizeError::InvalidCameras(kind) => {
                write!(f, "'devices.cameras' must be an object or array, got {kind}")
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a whole upstream document.
pub fn normalize_snapshot(payload: &Value) -> Result<NormalizedSnapshot, NormalizeError> {
    let root = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
    let devices = root
        .get("devices")
        .and_then(Value::as_object)
        .ok_or(NormalizeError::MissingDevices)?;

    let entries: Vec<(String, &Value)> = match devices.get("cameras") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(arr)) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Some(other) => return Err(NormalizeError::InvalidCameras(json_kind(other).to_string())),
    };

    let mut out = NormalizedSnapshot {
        total_entries: entries.len(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());

    for (key, entry) in entries {
        match normalize_camera(entry, &mut out.timestamp_issues) {
            Ok(record) => {
                if seen.insert(record.id.clone()) {
                    out.devices.push(record);
                } else {
                    out.dropped.push(DroppedEntry {
                        key,
                        reason: DropReason::DuplicateDeviceId(record.id),
                    });
                }
            }
            Err(reason) => out.dropped.push(DroppedEntry { key, reason }),
        }
    }

    Ok(out)
}

/// Normalize one camera entry. Unparsable timestamps become `None` and are
/// appended to `issues`.
pub fn normalize_camera(
    entry: &Value,
    issues: &mut Vec<TimestampIssue>,
) -> Result<DeviceRecord, DropReason> {
    let cam = entry.as_object().ok_or(DropReason::NotAnObject)?;

    let id = opt_str(cam, "device_id")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(DropReason::MissingDeviceId)?;

    let mut ts = |field: &'static str, v: Option<&Value>| -> Option<DateTime<Utc>> {
        match parse_timestamp(v) {
            Ok(t) => t,
            Err(raw) => {
                issues.push(TimestampIssue {
                    device_id: id.clone(),
                    field,
                    raw,
                });
                None
            }
        }
    };

    let last_online_change_at = ts("last_is_online_change", cam.get("last_is_online_change"));

    let last_event = match cam.get("last_event") {
        Some(Value::Object(ev)) => Some(EventRecord {
            start_time: ts("last_event.start_time", ev.get("start_time")),
            end_time: ts("last_event.end_time", ev.get("end_time")),
            has_motion: flag(ev, "has_motion"),
            has_sound: flag(ev, "has_sound"),
        }),
        _ => None,
    };

    let web_url = opt_str(cam, "web_url");
    let share = public_share(
        flag(cam, "is_public_share_enabled"),
        opt_str(cam, "public_share_url").as_deref(),
        web_url.as_deref(),
    );
    let (live_feed_url, embedded_markup) = match share {
        Some(s) => (Some(s.live_feed_url), Some(s.embedded_markup)),
        None => (None, None),
    };

    Ok(DeviceRecord {
        id: id.clone(),
        name: opt_str(cam, "name"),
        snapshot_url: opt_str(cam, "snapshot_url"),
        app_url: opt_str(cam, "app_url"),
        web_url,
        is_online: flag(cam, "is_online"),
        is_streaming: flag(cam, "is_streaming"),
        is_audio_enabled: flag(cam, "is_audio_input_enabled"),
        last_online_change_at,
        live_feed_url,
        embedded_markup,
        last_event,
        has_new_event: false,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn opt_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Absent/null -> `Ok(None)`. RFC 3339 strings and epoch-millisecond integers
/// parse. Anything else is `Err(raw)`.
fn parse_timestamp(v: Option<&Value>) -> Result<Option<DateTime<Utc>>, String> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| s.clone()),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| n.to_string()),
        Some(other) => Err(other.to_string()),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
