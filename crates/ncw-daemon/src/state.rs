//! Shared runtime state for ncw-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; the ingest actor holds the same `Arc`
//! and is the only writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::hub::BroadcastHub;
use crate::sink::SinkStats;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// IngestStatus
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamHealth {
    /// No snapshot or error seen yet.
    Starting,
    Healthy,
    /// Last read from the source failed; the cache holds the last good state.
    Degraded,
    /// The source ended; no further snapshots will arrive.
    Stopped,
}

/// Counters kept by the ingest actor, surfaced by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestStatus {
    pub upstream: UpstreamHealth,
    pub snapshots_applied: u64,
    /// Rejected by the monotonicity watermark.
    pub snapshots_stale: u64,
    /// Payloads that were not a device snapshot.
    pub snapshots_skipped: u64,
    pub source_errors: u64,
    /// Camera entries dropped by the normalizer, all snapshots.
    pub entries_dropped: u64,
    pub events_detected: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for IngestStatus {
    fn default() -> Self {
        Self {
            upstream: UpstreamHealth::Starting,
            snapshots_applied: 0,
            snapshots_stale: 0,
            snapshots_skipped: 0,
            source_errors: 0,
            entries_dropped: 0,
            events_detected: 0,
            last_snapshot_at: None,
            last_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers and the ingest actor.
#[derive(Clone)]
pub struct AppState {
    /// Latest collection + subscriptions.
    pub hub: Arc<BroadcastHub>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Written by the ingest actor only.
    pub ingest: Arc<RwLock<IngestStatus>>,
    /// Shared with the sink dispatcher.
    pub sink_stats: Arc<SinkStats>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AppState {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            hub: Arc::new(BroadcastHub::new(event_buffer)),
            build: BuildInfo {
                service: "ncw-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            ingest: Arc::new(RwLock::new(IngestStatus::default())),
            sink_stats: Arc::new(SinkStats::default()),
        }
    }

    /// Use the dispatcher's counters for status reporting.
    pub fn with_sink_stats(mut self, stats: Arc<SinkStats>) -> Self {
        self.sink_stats = stats;
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
