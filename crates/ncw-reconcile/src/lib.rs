//! ncw-reconcile
//!
//! Reconciliation Engine for camera snapshots.
//!
//! Architectural decisions:
//! - A snapshot is a full replacement set; absent ids are removed
//! - One record per id in the cache; the cache never stores `has_new_event`
//! - A new event is a change of `last_event.start_time` on a known device
//! - New devices never produce an event on first sight
//! - Snapshots older than the last accepted one are rejected
//!
//! Deterministic, pure logic. No IO. No logging.

mod cache;
mod detector;
mod engine;
mod types;
pub mod watermark;

pub use cache::DeviceCache;
pub use detector::{detect, has_new_event};
pub use engine::{flag_collection, ReconcileEngine, StaleSnapshot};
pub use types::*;
pub use watermark::{SnapshotFreshness, SnapshotWatermark};
