use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use ncw_schemas::{DeviceRecord, EventOccurrence};

use crate::watermark::{SnapshotFreshness, SnapshotWatermark};
use crate::{detect, DeviceCache, DeviceCollection, PassOutcome};

/// Returned by [`ReconcileEngine::apply`] when the snapshot is older than
/// the last accepted one. The cache was not touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleSnapshot {
    pub freshness: SnapshotFreshness,
}

impl fmt::Display for StaleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.freshness {
            SnapshotFreshness::Stale { watermark, got } => write!(
                f,
                "stale snapshot rejected: watermark={} got={}",
                watermark.to_rfc3339(),
                got.to_rfc3339()
            ),
            SnapshotFreshness::Fresh => {
                write!(f, "StaleSnapshot: constructed with Fresh (logic error)")
            }
        }
    }
}

impl std::error::Error for StaleSnapshot {}

/// Cache + watermark + detector: one reconciliation pass per call.
///
/// Owned by exactly one task; `&mut self` serializes passes.
#[derive(Clone, Debug, Default)]
pub struct ReconcileEngine {
    cache: DeviceCache,
    watermark: SnapshotWatermark,
}

impl ReconcileEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn watermark(&self) -> &SnapshotWatermark {
        &self.watermark
    }

    /// Watermark-checked pass for snapshots carrying an upstream stamp.
    pub fn apply(
        &mut self,
        observed_at: DateTime<Utc>,
        candidates: Vec<DeviceRecord>,
    ) -> Result<PassOutcome, StaleSnapshot> {
        let freshness = self.watermark.accept(observed_at);
        if freshness.is_rejected() {
            return Err(StaleSnapshot { freshness });
        }
        Ok(self.run_pass(candidates))
    }

    /// Pass without the freshness check (pure content comparison).
    pub fn run_pass(&mut self, candidates: Vec<DeviceRecord>) -> PassOutcome {
        let outcome = self.cache.reconcile(candidates);
        let occurrences = detect(&outcome.changed);
        let collection = flag_collection(&outcome.updated, &occurrences);

        PassOutcome {
            generation: outcome.generation,
            collection,
            occurrences,
            added: outcome.added,
            removed: outcome.removed,
        }
    }
}

/// Copy of `updated` with `has_new_event` set on exactly the flagged ids.
///
/// Returns the same allocation when nothing was flagged.
pub fn flag_collection(
    updated: &DeviceCollection,
    occurrences: &[EventOccurrence],
) -> DeviceCollection {
    if occurrences.is_empty() {
        return DeviceCollection::clone(updated);
    }
    let flagged: HashSet<&str> = occurrences.iter().map(|o| o.device_id()).collect();
    updated
        .iter()
        .map(|d| {
            let mut d = d.clone();
            d.has_new_event = flagged.contains(d.id.as_str());
            d
        })
        .collect()
}
