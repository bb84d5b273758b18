//! Scenario: Event Detection Exactly Once
//!
//! # Invariants under test
//!
//! 1. Applying the same snapshot twice produces no occurrence on the second
//!    pass and leaves the cached state equal.
//! 2. T1 -> T1 -> T2 on one device flags exactly once, on the third pass.
//! 3. A device seen for the first time is never flagged, even with an event.
//! 4. A device that lost its last event is not flagged; a device that gains
//!    one after having none is not flagged either.
//! 5. The occurrence id is stable for (device id, start time).
//! 6. Full replacement: ids absent from the snapshot disappear from the cache.
//!
//! All tests are pure in-process.

use chrono::{DateTime, TimeZone, Utc};
use ncw_reconcile::ReconcileEngine;
use ncw_schemas::{occurrence_id, DeviceRecord, EventRecord};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

fn cam(id: &str, event_start: Option<i64>) -> DeviceRecord {
    let mut d = DeviceRecord::bare(id);
    d.name = Some(format!("{id} camera"));
    d.is_online = true;
    d.last_event = event_start.map(|s| EventRecord {
        start_time: Some(ts(s)),
        end_time: Some(ts(s + 20)),
        has_motion: true,
        has_sound: false,
    });
    d
}

// ---------------------------------------------------------------------------
// 1. Idempotence
// ---------------------------------------------------------------------------

#[test]
fn identical_snapshot_twice_is_idempotent() {
    let mut engine = ReconcileEngine::new();
    let snapshot = vec![cam("A", Some(10)), cam("B", None)];

    let first = engine.apply(ts(100), snapshot.clone()).unwrap();
    let cached_after_first = engine.cache().current();

    let second = engine.apply(ts(200), snapshot).unwrap();

    assert!(first.occurrences.is_empty());
    assert!(second.occurrences.is_empty());
    assert_eq!(&*cached_after_first, &*engine.cache().current());
    assert!(second.collection.iter().all(|d| !d.has_new_event));
    assert_eq!(second.generation, 2);
}

// ---------------------------------------------------------------------------
// 2. T1 -> T1 -> T2
// ---------------------------------------------------------------------------

#[test]
fn t1_t1_t2_flags_exactly_once() {
    let mut engine = ReconcileEngine::new();

    let p1 = engine.apply(ts(100), vec![cam("A", Some(10))]).unwrap();
    let p2 = engine.apply(ts(200), vec![cam("A", Some(10))]).unwrap();
    let p3 = engine.apply(ts(300), vec![cam("A", Some(50))]).unwrap();
    let p4 = engine.apply(ts(400), vec![cam("A", Some(50))]).unwrap();

    assert!(p1.occurrences.is_empty());
    assert!(p2.occurrences.is_empty());
    assert_eq!(p3.occurrences.len(), 1);
    assert!(p4.occurrences.is_empty());

    let occ = &p3.occurrences[0];
    assert_eq!(occ.device_id(), "A");
    assert_eq!(occ.start_time, ts(50));
    assert!(occ.device.has_new_event);
    assert!(p3.collection[0].has_new_event);
    assert!(!p4.collection[0].has_new_event);
}

// ---------------------------------------------------------------------------
// 3. New device
// ---------------------------------------------------------------------------

#[test]
fn new_device_with_event_is_not_flagged() {
    let mut engine = ReconcileEngine::new();
    engine.apply(ts(100), vec![cam("A", Some(10))]).unwrap();

    let pass = engine
        .apply(ts(200), vec![cam("A", Some(10)), cam("B", Some(99))])
        .unwrap();

    assert!(pass.occurrences.is_empty());
    assert_eq!(pass.added, vec!["B".to_string()]);
    assert!(pass.collection.iter().all(|d| !d.has_new_event));
}

// ---------------------------------------------------------------------------
// 4. Missing last event on either side
// ---------------------------------------------------------------------------

#[test]
fn event_appearing_or_disappearing_is_not_flagged() {
    let mut engine = ReconcileEngine::new();
    engine.apply(ts(100), vec![cam("A", None)]).unwrap();

    let gained = engine.apply(ts(200), vec![cam("A", Some(10))]).unwrap();
    assert!(gained.occurrences.is_empty());

    let lost = engine.apply(ts(300), vec![cam("A", None)]).unwrap();
    assert!(lost.occurrences.is_empty());
}

// ---------------------------------------------------------------------------
// 5. Occurrence identity
// ---------------------------------------------------------------------------

#[test]
fn occurrence_id_is_deterministic() {
    let mut a = ReconcileEngine::new();
    let mut b = ReconcileEngine::new();

    for engine in [&mut a, &mut b] {
        engine.apply(ts(1), vec![cam("A", Some(10))]).unwrap();
    }
    let pa = a.apply(ts(2), vec![cam("A", Some(20))]).unwrap();
    let pb = b.apply(ts(2), vec![cam("A", Some(20))]).unwrap();

    assert_eq!(pa.occurrences[0].occurrence_id, pb.occurrences[0].occurrence_id);
    assert_eq!(
        pa.occurrences[0].occurrence_id,
        occurrence_id("A", ts(20))
    );
    assert_ne!(
        pa.occurrences[0].occurrence_id,
        occurrence_id("B", ts(20))
    );
}

// ---------------------------------------------------------------------------
// 6. Full replacement
// ---------------------------------------------------------------------------

#[test]
fn absent_ids_are_removed_and_reappear_unflagged() {
    let mut engine = ReconcileEngine::new();
    engine
        .apply(ts(1), vec![cam("A", Some(10)), cam("B", Some(10))])
        .unwrap();

    let pass = engine.apply(ts(2), vec![cam("A", Some(10))]).unwrap();
    assert_eq!(pass.removed, vec!["B".to_string()]);
    assert!(engine.cache().get("B").is_none());

    // B comes back with a different event: it is new again, so no flag.
    let back = engine
        .apply(ts(3), vec![cam("A", Some(10)), cam("B", Some(77))])
        .unwrap();
    assert!(back.occurrences.is_empty());
    assert_eq!(back.added, vec!["B".to_string()]);
}

#[test]
fn multiple_devices_flag_independently_in_snapshot_order() {
    let mut engine = ReconcileEngine::new();
    engine
        .apply(
            ts(1),
            vec![cam("C", Some(1)), cam("A", Some(1)), cam("B", Some(1))],
        )
        .unwrap();

    let pass = engine
        .apply(
            ts(2),
            vec![cam("C", Some(2)), cam("A", Some(1)), cam("B", Some(2))],
        )
        .unwrap();

    let ids: Vec<&str> = pass.occurrences.iter().map(|o| o.device_id()).collect();
    assert_eq!(ids, vec!["C", "B"]);
    let flags: Vec<bool> = pass.collection.iter().map(|d| d.has_new_event).collect();
    assert_eq!(flags, vec![true, false, true]);
}
