//! Data-quality report for one normalized snapshot.
//!
//! Covers:
//! - total / accepted entry counts
//! - dropped entries per reason
//! - timestamps that were present but unparsable
//! - events whose `start_time` is after their `end_time`
//!
//! Nothing here is fatal. The report exists so the caller can log it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::normalizer::{NormalizedSnapshot, TimestampIssue};

/// An event whose start is after its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvertedEvent {
    pub device_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Summary produced by [`build_quality_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub total_entries: usize,
    pub accepted: usize,
    /// Dropped entry count keyed by [`crate::DropReason::label`].
    pub dropped_by_reason: BTreeMap<&'static str, usize>,
    pub unparsable_timestamps: Vec<TimestampIssue>,
    /// Sorted by device id.
    pub inverted_events: Vec<InvertedEvent>,
}

impl QualityReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped_by_reason.values().sum()
    }

    /// `true` when nothing was dropped and every timestamp was usable.
    pub fn is_clean(&self) -> bool {
        self.dropped_by_reason.is_empty()
            && self.unparsable_timestamps.is_empty()
            && self.inverted_events.is_empty()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} accepted={} dropped={}",
            self.total_entries,
            self.accepted,
            self.dropped_total()
        )?;
        for (reason, n) in &self.dropped_by_reason {
            write!(f, " {reason}={n}")?;
        }
        write!(
            f,
            " unparsable_timestamps={} inverted_events={}",
            self.unparsable_timestamps.len(),
            self.inverted_events.len()
        )
    }
}

/// Build the report for a normalized snapshot.
pub fn build_quality_report(snap: &NormalizedSnapshot) -> QualityReport {
    let mut dropped_by_reason: BTreeMap<&'static str, usize> = BTreeMap::new();
    for d in &snap.dropped {
        *dropped_by_reason.entry(d.reason.label()).or_insert(0) += 1;
    }

    let mut inverted_events: Vec<InvertedEvent> = snap
        .devices
        .iter()
        .filter_map(|d| {
            let ev = d.last_event.as_ref()?;
            match (ev.start_time, ev.end_time) {
                (Some(start_time), Some(end_time)) if !ev.is_well_formed() => {
                    Some(InvertedEvent {
                        device_id: d.id.clone(),
                        start_time,
                        end_time,
                    })
                }
                _ => None,
            }
        })
        .collect();
    inverted_events.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    QualityReport {
        total_entries: snap.total_entries,
        accepted: snap.devices.len(),
        dropped_by_reason,
        unparsable_timestamps: snap.timestamp_issues.clone(),
        inverted_events,
    }
}
