//! Scenario: Flag Properties (property-based)
//!
//! # Invariants under test
//!
//! For any sequence of snapshots over a small id space:
//!
//! 1. A device is flagged on pass `n` iff it was present on pass `n - 1` and
//!    on pass `n`, both with an event, and the start times differ.
//! 2. No `(device id, start time)` is flagged twice in a row.
//! 3. The cached state never carries `has_new_event == true`.
//! 4. The published collection lists exactly the snapshot's ids, in order.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use ncw_reconcile::ReconcileEngine;
use ncw_schemas::{DeviceRecord, EventRecord};
use proptest::prelude::*;

const IDS: [&str; 4] = ["A", "B", "C", "D"];

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

/// One snapshot: for each id, absent / present without event / present with
/// an event starting at one of a few times.
fn snapshot_strategy() -> impl Strategy<Value = Vec<Option<Option<i64>>>> {
    prop::collection::vec(
        prop_oneof![
            Just(None),
            Just(Some(None)),
            (0i64..3).prop_map(|s| Some(Some(s))),
        ],
        IDS.len(),
    )
}

fn build(snapshot: &[Option<Option<i64>>]) -> Vec<DeviceRecord> {
    IDS.iter()
        .zip(snapshot)
        .filter_map(|(id, slot)| {
            slot.map(|event| {
                let mut d = DeviceRecord::bare(*id);
                d.last_event = event.map(|s| EventRecord {
                    start_time: Some(ts(s)),
                    end_time: None,
                    has_motion: true,
                    has_sound: false,
                });
                d
            })
        })
        .collect()
}

proptest! {
    #[test]
    fn flags_exactly_at_distinct_transitions(
        snapshots in prop::collection::vec(snapshot_strategy(), 1..12)
    ) {
        let mut engine = ReconcileEngine::new();
        let mut previous: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        let mut last_flag: HashMap<String, DateTime<Utc>> = HashMap::new();

        for (i, raw) in snapshots.iter().enumerate() {
            let candidates = build(raw);
            let pass = engine.apply(ts(1_000 + i as i64), candidates.clone()).unwrap();

            let flagged: HashMap<&str, DateTime<Utc>> = pass
                .occurrences
                .iter()
                .map(|o| (o.device_id(), o.start_time))
                .collect();

            for device in &candidates {
                let expected = match (previous.get(&device.id), device.last_event_start()) {
                    (Some(Some(before)), Some(now)) => before != &now,
                    _ => false,
                };
                prop_assert_eq!(flagged.contains_key(device.id.as_str()), expected);

                if let Some(start) = flagged.get(device.id.as_str()) {
                    prop_assert_ne!(last_flag.get(&device.id), Some(start));
                }
            }

            for (id, start) in &flagged {
                last_flag.insert(id.to_string(), *start);
            }
            // A device that vanished or lost its event starts a fresh history.
            last_flag.retain(|id, _| {
                candidates
                    .iter()
                    .any(|d| &d.id == id && d.last_event_start().is_some())
            });

            prop_assert!(engine.cache().current().iter().all(|d| !d.has_new_event));

            let published: Vec<&str> = pass.collection.iter().map(|d| d.id.as_str()).collect();
            let expected_ids: Vec<&str> = candidates.iter().map(|d| d.id.as_str()).collect();
            prop_assert_eq!(published, expected_ids);

            previous = candidates
                .iter()
                .map(|d| (d.id.clone(), d.last_event_start()))
                .collect();
        }
    }
}
