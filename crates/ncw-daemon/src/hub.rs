//! Broadcast hub: latest device collection + live motion events.
//!
//! Two subscriber classes with different delivery rules:
//!
//! - **collections** (`watch`): a new subscriber first gets the current
//!   collection, then every later one. A slow subscriber may skip
//!   intermediate versions but always ends on the latest.
//! - **events** (`broadcast`): live only. Each event at most once per
//!   subscriber, in publish order. A subscriber that falls more than
//!   `event_buffer` behind loses the overflow and a warning is logged.
//!
//! Publishing never waits on subscribers.
//!
//! It does **not**:
//! - decide what is new (that is `ncw-reconcile`)
//! - call the external sink (that is `sink.rs`)

use std::sync::{Mutex, PoisonError};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use ncw_reconcile::DeviceCollection;
use ncw_schemas::{DeviceRecord, EventOccurrence};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::warn;

// ---------------------------------------------------------------------------
// CollectionUpdate
// ---------------------------------------------------------------------------

/// One published collection version.
#[derive(Clone, Debug)]
pub struct CollectionUpdate {
    /// Reconcile generation; 0 is the empty collection before any snapshot.
    pub generation: u64,
    pub devices: DeviceCollection,
}

impl CollectionUpdate {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            devices: DeviceCollection::from(Vec::<DeviceRecord>::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

struct Channels {
    collection: watch::Sender<CollectionUpdate>,
    events: broadcast::Sender<EventOccurrence>,
}

/// Shared by the ingest actor (publisher) and every HTTP handler (readers).
pub struct BroadcastHub {
    /// `None` once closed. Dropping the senders ends every subscription.
    channels: Mutex<Option<Channels>>,
    /// Kept so `current()` still answers after close.
    latest: watch::Receiver<CollectionUpdate>,
}

impl BroadcastHub {
    pub fn new(event_buffer: usize) -> Self {
        let (collection, latest) = watch::channel(CollectionUpdate::empty());
        let (events, _rx) = broadcast::channel(event_buffer.max(1));
        Self {
            channels: Mutex::new(Some(Channels { collection, events })),
            latest,
        }
    }

    fn with_channels<R>(&self, f: impl FnOnce(&Channels) -> R) -> Option<R> {
        let guard = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f)
    }

    /// Replace the latest collection. No-op after close.
    pub fn publish_collection(&self, generation: u64, devices: DeviceCollection) {
        self.with_channels(|ch| {
            ch.collection.send_replace(CollectionUpdate {
                generation,
                devices,
            });
        });
    }

    /// Deliver one event to current event subscribers. No-op after close.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish_event(&self, event: EventOccurrence) -> usize {
        self.with_channels(|ch| ch.events.send(event).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Atomic read of the latest collection.
    pub fn current(&self) -> CollectionUpdate {
        self.latest.borrow().clone()
    }

    /// Replay-then-live collection subscription.
    pub fn subscribe_collection(&self) -> CollectionSubscription {
        let rx = self.with_channels(|ch| ch.collection.subscribe());
        CollectionSubscription {
            rx,
            replay_pending: true,
        }
    }

    /// Live-only event subscription.
    pub fn subscribe_events(&self) -> EventSubscription {
        EventSubscription {
            rx: self.with_channels(|ch| ch.events.subscribe()),
        }
    }

    /// End every subscription. Later publishes are ignored.
    pub fn close(&self) {
        let mut guard = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.with_channels(|_| ()).is_none()
    }

    pub fn event_subscriber_count(&self) -> usize {
        self.with_channels(|ch| ch.events.receiver_count())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Yields the current collection first, then each newer one.
/// Ends (`None`) when the hub closes. Dropping it unsubscribes.
pub struct CollectionSubscription {
    rx: Option<watch::Receiver<CollectionUpdate>>,
    replay_pending: bool,
}

impl CollectionSubscription {
    pub async fn recv(&mut self) -> Option<CollectionUpdate> {
        let rx = self.rx.as_mut()?;
        if self.replay_pending {
            self.replay_pending = false;
            return Some(rx.borrow_and_update().clone());
        }
        match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => {
                self.rx = None;
                None
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, CollectionUpdate> {
        match self.rx {
            Some(rx) if self.replay_pending => WatchStream::new(rx).boxed(),
            Some(rx) => WatchStream::from_changes(rx).boxed(),
            None => futures_util::stream::empty().boxed(),
        }
    }
}

/// Yields events published after it was created. Ends when the hub closes.
pub struct EventSubscription {
    rx: Option<broadcast::Receiver<EventOccurrence>>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<EventOccurrence> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "motion event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, EventOccurrence> {
        let Some(rx) = self.rx else {
            return futures_util::stream::empty().boxed();
        };
        BroadcastStream::new(rx)
            .filter_map(|item| async move {
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "motion event subscriber lagged; events dropped");
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn collection(ids: &[&str]) -> DeviceCollection {
        ids.iter().map(|id| DeviceRecord::bare(*id)).collect()
    }

    fn event(id: &str, secs: i64) -> EventOccurrence {
        let start = Utc.timestamp_opt(secs, 0).single().unwrap();
        EventOccurrence::new(DeviceRecord::bare(id), start)
    }

    #[tokio::test]
    async fn fresh_hub_replays_empty_generation_zero() {
        let hub = BroadcastHub::new(8);
        let mut sub = hub.subscribe_collection();
        let first = sub.recv().await.unwrap();
        assert_eq!(first.generation, 0);
        assert!(first.devices.is_empty());
    }

    #[tokio::test]
    async fn publish_after_close_is_ignored() {
        let hub = BroadcastHub::new(8);
        hub.publish_collection(1, collection(&["A"]));
        hub.close();
        hub.publish_collection(2, collection(&["B"]));
        assert_eq!(hub.publish_event(event("A", 1)), 0);

        assert!(hub.is_closed());
        let cur = hub.current();
        assert_eq!(cur.generation, 1);
        assert_eq!(cur.devices[0].id, "A");
    }

    #[tokio::test]
    async fn subscribe_after_close_ends_immediately() {
        let hub = BroadcastHub::new(8);
        hub.close();
        assert!(hub.subscribe_collection().recv().await.is_none());
        assert!(hub.subscribe_events().recv().await.is_none());
    }

    #[tokio::test]
    async fn event_subscriber_does_not_see_earlier_events() {
        let hub = BroadcastHub::new(8);
        hub.publish_event(event("A", 1));
        let mut sub = hub.subscribe_events();
        hub.publish_event(event("B", 2));
        hub.close();

        assert_eq!(sub.recv().await.unwrap().device_id(), "B");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn lagging_event_subscriber_skips_overflow_and_continues() {
        let hub = BroadcastHub::new(2);
        let mut sub = hub.subscribe_events();
        for i in 0..5 {
            hub.publish_event(event("A", i));
        }
        hub.close();

        let mut got = Vec::new();
        while let Some(ev) = sub.recv().await {
            got.push(ev.start_time.timestamp());
        }
        assert_eq!(got, vec![3, 4]);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let hub = BroadcastHub::new(8);
        let sub = hub.subscribe_events();
        assert_eq!(hub.event_subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.event_subscriber_count(), 0);
    }
}
