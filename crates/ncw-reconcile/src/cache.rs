use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ncw_schemas::DeviceRecord;

use crate::{ChangePair, DeviceCollection, ReconcileOutcome};

/// Last-known device state. Single owner; mutated only by [`DeviceCache::reconcile`].
#[derive(Clone, Debug)]
pub struct DeviceCache {
    devices: DeviceCollection,
    generation: u64,
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCache {
    /// Empty cache, generation 0.
    pub fn new() -> Self {
        Self {
            devices: Arc::from(Vec::new()),
            generation: 0,
        }
    }

    /// Shared handle to the current state.
    pub fn current(&self) -> DeviceCollection {
        Arc::clone(&self.devices)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Replace the cache with `candidates` and classify every id.
    ///
    /// - id cached and incoming => `changed` (prior, candidate)
    /// - id only incoming       => `added`
    /// - id only cached         => `removed`
    ///
    /// A repeated id in `candidates` keeps its first occurrence. The stored
    /// records always have `has_new_event == false`.
    pub fn reconcile(&mut self, candidates: Vec<DeviceRecord>) -> ReconcileOutcome {
        let prior_index: HashMap<&str, &DeviceRecord> =
            self.devices.iter().map(|d| (d.id.as_str(), d)).collect();

        let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
        let mut updated: Vec<DeviceRecord> = Vec::with_capacity(candidates.len());
        let mut changed: Vec<ChangePair> = Vec::new();
        let mut added: Vec<String> = Vec::new();

        for mut candidate in candidates {
            if !seen.insert(candidate.id.clone()) {
                continue;
            }
            candidate.has_new_event = false;

            match prior_index.get(candidate.id.as_str()) {
                Some(prior) => changed.push(ChangePair {
                    prior: (*prior).clone(),
                    candidate: candidate.clone(),
                }),
                None => added.push(candidate.id.clone()),
            }
            updated.push(candidate);
        }

        let removed: Vec<String> = self
            .devices
            .iter()
            .filter(|d| !seen.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();

        self.devices = Arc::from(updated);
        self.generation += 1;

        ReconcileOutcome {
            generation: self.generation,
            updated: self.current(),
            changed,
            added,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str) -> DeviceRecord {
        DeviceRecord::bare(id)
    }

    #[test]
    fn first_snapshot_is_all_added() {
        let mut cache = DeviceCache::new();
        let out = cache.reconcile(vec![dev("A"), dev("B")]);
        assert_eq!(out.generation, 1);
        assert_eq!(out.added, vec!["A", "B"]);
        assert!(out.changed.is_empty());
        assert!(out.removed.is_empty());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn classifies_changed_added_removed() {
        let mut cache = DeviceCache::new();
        cache.reconcile(vec![dev("A"), dev("B")]);
        let out = cache.reconcile(vec![dev("B"), dev("C")]);

        assert_eq!(out.generation, 2);
        assert_eq!(out.added, vec!["C"]);
        assert_eq!(out.removed, vec!["A"]);
        assert_eq!(out.changed.len(), 1);
        assert_eq!(out.changed[0].prior.id, "B");
        assert_eq!(out.changed[0].candidate.id, "B");

        let ids: Vec<&str> = out.updated.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!(cache.get("A").is_none());
    }

    #[test]
    fn preserves_snapshot_order() {
        let mut cache = DeviceCache::new();
        let out = cache.reconcile(vec![dev("Z"), dev("A"), dev("M")]);
        let ids: Vec<&str> = out.updated.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Z", "A", "M"]);
    }

    #[test]
    fn duplicate_candidate_ids_keep_first() {
        let mut first = dev("A");
        first.name = Some("first".to_string());
        let mut second = dev("A");
        second.name = Some("second".to_string());

        let mut cache = DeviceCache::new();
        let out = cache.reconcile(vec![first, second]);
        assert_eq!(out.updated.len(), 1);
        assert_eq!(cache.get("A").unwrap().name.as_deref(), Some("first"));
    }

    #[test]
    fn stored_state_never_carries_the_flag() {
        let mut flagged = dev("A");
        flagged.has_new_event = true;

        let mut cache = DeviceCache::new();
        cache.reconcile(vec![flagged]);
        assert!(!cache.get("A").unwrap().has_new_event);
    }

    #[test]
    fn empty_snapshot_removes_everything() {
        let mut cache = DeviceCache::new();
        cache.reconcile(vec![dev("A")]);
        let out = cache.reconcile(Vec::new());
        assert_eq!(out.removed, vec!["A"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn previous_handle_is_unaffected_by_reconcile() {
        let mut cache = DeviceCache::new();
        cache.reconcile(vec![dev("A")]);
        let before = cache.current();
        cache.reconcile(vec![dev("B")]);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, "A");
        assert_eq!(cache.current()[0].id, "B");
    }
}
