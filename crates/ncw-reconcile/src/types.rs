use std::sync::Arc;

use ncw_schemas::{DeviceRecord, EventOccurrence};

/// Immutable, cheaply shared device collection. Swapped whole, never edited.
pub type DeviceCollection = Arc<[DeviceRecord]>;

/// The same id seen in the prior cache and in the incoming snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangePair {
    pub prior: DeviceRecord,
    pub candidate: DeviceRecord,
}

/// What one `DeviceCache::reconcile` call did.
#[derive(Clone, Debug)]
pub struct ReconcileOutcome {
    /// Cache generation after this reconcile (first snapshot = 1).
    pub generation: u64,
    /// New authoritative state, snapshot order, `has_new_event == false`.
    pub updated: DeviceCollection,
    /// Ids present before and now, in snapshot order.
    pub changed: Vec<ChangePair>,
    /// Ids seen for the first time, in snapshot order.
    pub added: Vec<String>,
    /// Ids that were cached but are absent from this snapshot.
    pub removed: Vec<String>,
}

/// Full result of one reconciliation pass: what to publish.
#[derive(Clone, Debug)]
pub struct PassOutcome {
    pub generation: u64,
    /// Collection to publish: `has_new_event == true` exactly on flagged ids.
    pub collection: DeviceCollection,
    /// One entry per newly detected event, in snapshot order.
    pub occurrences: Vec<EventOccurrence>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PassOutcome {
    pub fn device_count(&self) -> usize {
        self.collection.len()
    }
}
