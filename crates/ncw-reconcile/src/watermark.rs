//! Snapshot monotonicity watermark.
//!
//! # Purpose
//!
//! A snapshot delivered late (replayed buffer, reconnect race) describes an
//! older world. Applying it would roll the cache back and make the next
//! fresh snapshot look like a new event. This module tracks the upstream's
//! own stamp on the last accepted snapshot and rejects anything older.
//! Local arrival time is never fed in: a wall-clock step backwards would
//! make the newest snapshot look stale.
//!
//! # Invariants
//!
//! - **Non-decreasing**: a snapshot is accepted only if its `observed_at` is
//!   >= the last accepted one.
//! - **Watermark advances only on acceptance**: rejections do not move it.
//! - **Pure, no IO**: the caller supplies the timestamp.

use chrono::{DateTime, Utc};

/// Result of checking a snapshot timestamp against the watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotFreshness {
    /// Timestamp is >= the watermark (or nothing was accepted yet).
    Fresh,

    /// Timestamp is strictly older than the last accepted snapshot.
    Stale {
        watermark: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

impl SnapshotFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, SnapshotFreshness::Fresh)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fresh()
    }
}

/// Tracks the last accepted snapshot time.
///
/// Call [`accept`][SnapshotWatermark::accept] on every incoming snapshot and
/// reconcile only when it returns [`SnapshotFreshness::Fresh`].
/// [`check`][SnapshotWatermark::check] is the read-only probe.
#[derive(Clone, Debug, Default)]
pub struct SnapshotWatermark {
    last_accepted: Option<DateTime<Utc>>,
}

impl SnapshotWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freshness **without** advancing the watermark.
    pub fn check(&self, observed_at: DateTime<Utc>) -> SnapshotFreshness {
        match self.last_accepted {
            Some(watermark) if observed_at < watermark => SnapshotFreshness::Stale {
                watermark,
                got: observed_at,
            },
            _ => SnapshotFreshness::Fresh,
        }
    }

    /// Freshness, advancing the watermark when fresh.
    pub fn accept(&mut self, observed_at: DateTime<Utc>) -> SnapshotFreshness {
        let result = self.check(observed_at);
        if result.is_fresh() {
            self.last_accepted = Some(observed_at);
        }
        result
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn first_snapshot_is_fresh() {
        let mut wm = SnapshotWatermark::new();
        assert!(wm.accept(ts(10)).is_fresh());
        assert_eq!(wm.last_accepted(), Some(ts(10)));
    }

    #[test]
    fn equal_timestamp_is_fresh() {
        let mut wm = SnapshotWatermark::new();
        wm.accept(ts(10));
        assert_eq!(wm.accept(ts(10)), SnapshotFreshness::Fresh);
    }

    #[test]
    fn older_timestamp_is_stale_and_does_not_move_watermark() {
        let mut wm = SnapshotWatermark::new();
        wm.accept(ts(10));
        assert_eq!(
            wm.accept(ts(5)),
            SnapshotFreshness::Stale {
                watermark: ts(10),
                got: ts(5)
            }
        );
        assert_eq!(wm.last_accepted(), Some(ts(10)));
    }

    #[test]
    fn check_is_read_only() {
        let wm = SnapshotWatermark::new();
        assert!(wm.check(ts(3)).is_fresh());
        assert_eq!(wm.last_accepted(), None);
    }
}
