use ncw_schemas::{DeviceRecord, EventOccurrence};

use crate::ChangePair;

/// `true` iff both sides have a last event with a known start time and the
/// start times differ.
///
/// Only `start_time` decides novelty: an event with the same start time but
/// different `has_motion` / `has_sound` is the same occurrence.
pub fn has_new_event(prior: &DeviceRecord, candidate: &DeviceRecord) -> bool {
    match (prior.last_event_start(), candidate.last_event_start()) {
        (Some(before), Some(now)) => before != now,
        _ => false,
    }
}

/// One occurrence per flagged pair, in input order.
///
/// The returned device copies have `has_new_event == true`; the pairs are
/// left untouched.
pub fn detect(changed: &[ChangePair]) -> Vec<EventOccurrence> {
    changed
        .iter()
        .filter(|pair| has_new_event(&pair.prior, &pair.candidate))
        .filter_map(|pair| {
            let start = pair.candidate.last_event_start()?;
            let mut device = pair.candidate.clone();
            device.has_new_event = true;
            Some(EventOccurrence::new(device, start))
        })
        .collect()
}
