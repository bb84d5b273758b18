//! Canonical camera state shared by every ncw crate.
//!
//! Pure data. No IO, no parsing of upstream payloads (that is `ncw-ingest`),
//! no comparison logic (that is `ncw-reconcile`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic occurrence ids (UUID v5).
const OCCURRENCE_NAMESPACE: Uuid = Uuid::from_u128(0x6e63_775f_6f63_6375_7272_656e_6365_0001);

/// Last motion/sound event reported by a camera.
///
/// Timestamps that the upstream sent but that could not be parsed are `None`.
/// A record with `start_time == None` never takes part in novelty comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub has_motion: bool,
    pub has_sound: bool,
}

impl EventRecord {
    /// `false` only when both timestamps are known and `start_time > end_time`.
    ///
    /// An inverted event is a data-quality condition; it is still cached and
    /// still compared.
    pub fn is_well_formed(&self) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// One camera as the rest of the system sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: Option<String>,
    pub snapshot_url: Option<String>,
    pub app_url: Option<String>,
    pub web_url: Option<String>,
    pub is_online: bool,
    pub is_streaming: bool,
    pub is_audio_enabled: bool,
    pub last_online_change_at: Option<DateTime<Utc>>,
    /// Present only when public sharing is enabled upstream.
    pub live_feed_url: Option<String>,
    /// Present only when public sharing is enabled upstream.
    pub embedded_markup: Option<String>,
    pub last_event: Option<EventRecord>,
    /// True only in the collection published by the pass that first saw the
    /// current `last_event`. Never true in cached state.
    #[serde(default)]
    pub has_new_event: bool,
}

impl DeviceRecord {
    /// A record with only the identifier set. Every optional field is absent.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            snapshot_url: None,
            app_url: None,
            web_url: None,
            is_online: false,
            is_streaming: false,
            is_audio_enabled: false,
            last_online_change_at: None,
            live_feed_url: None,
            embedded_markup: None,
            last_event: None,
            has_new_event: false,
        }
    }

    /// Start time of the last event, if the event exists and its start time parsed.
    pub fn last_event_start(&self) -> Option<DateTime<Utc>> {
        self.last_event.as_ref().and_then(|e| e.start_time)
    }

    /// Name for logs and the sink; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A newly detected event on one device.
///
/// `device` is a read-only copy with `has_new_event == true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOccurrence {
    pub occurrence_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub device: DeviceRecord,
}

impl EventOccurrence {
    pub fn new(device: DeviceRecord, start_time: DateTime<Utc>) -> Self {
        Self {
            occurrence_id: occurrence_id(&device.id, start_time),
            start_time,
            device,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Payload handed to the external event sink.
    pub fn to_motion_event(&self) -> MotionEventRecord {
        MotionEventRecord {
            device_id: self.device.id.clone(),
            device_name: self.device.display_name().to_string(),
            start_time: self.start_time,
            image_url: self.device.snapshot_url.clone(),
            has_motion: self
                .device
                .last_event
                .as_ref()
                .map(|e| e.has_motion)
                .unwrap_or(false),
        }
    }
}

/// Deterministic id for the occurrence `(device_id, start_time)`.
pub fn occurrence_id(device_id: &str, start_time: DateTime<Utc>) -> Uuid {
    let key = format!(
        "{}|{}",
        device_id,
        start_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    Uuid::new_v5(&OCCURRENCE_NAMESPACE, key.as_bytes())
}

/// Record sent to the remote event log for each occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEventRecord {
    pub device_id: String,
    pub device_name: String,
    pub start_time: DateTime<Utc>,
    pub image_url: Option<String>,
    pub has_motion: bool,
}
