//! Response types for all ncw-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use ncw_schemas::DeviceRecord;
use serde::{Deserialize, Serialize};

use crate::hub::CollectionUpdate;
use crate::sink::SinkStatsSnapshot;
use crate::state::IngestStatus;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub generation: u64,
    pub device_count: usize,
    pub ingest: IngestStatus,
    pub sink: SinkStatsSnapshot,
    pub hub_closed: bool,
}

// ---------------------------------------------------------------------------
// /v1/devices
// ---------------------------------------------------------------------------

/// Also the payload of SSE `devices` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub generation: u64,
    pub devices: Vec<DeviceRecord>,
}

impl From<&CollectionUpdate> for DevicesResponse {
    fn from(update: &CollectionUpdate) -> Self {
        Self {
            generation: update.generation,
            devices: update.devices.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
