//! Ingest actor: the single owner of reconciliation state.
//!
//! One task pulls raw snapshots from a [`SnapshotSource`], runs them through
//! normalize -> quality report -> watermark (upstream-stamped snapshots only)
//! -> reconcile + detect, and publishes the outcome. Snapshots are processed strictly one at a time;
//! shutdown is only observed between snapshots, never mid-pass.
//!
//! On stop (shutdown signal or end of stream) the hub is closed, which ends
//! every subscription. The sink dispatcher handle is dropped with the actor,
//! so the sink worker drains its queue and exits.

use std::sync::Arc;

use ncw_ingest::{build_quality_report, normalize_snapshot, RawSnapshot, SnapshotSource};
use ncw_reconcile::ReconcileEngine;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sink::SinkDispatcher;
use crate::state::{AppState, UpstreamHealth};

/// Handle to a running ingest actor.
pub struct IngestHandle {
    shutdown: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

/// Cloneable trigger that stops the actor after its current pass.
#[derive(Clone)]
pub struct IngestStopper {
    shutdown: Arc<watch::Sender<bool>>,
}

impl IngestStopper {
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl IngestHandle {
    pub fn stopper(&self) -> IngestStopper {
        IngestStopper {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Signal shutdown and wait for the actor to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.join().await;
    }

    /// Wait for the actor to end on its own (source exhausted) or after a stop.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "ingest task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the ingest actor on the current runtime.
pub fn spawn_ingest<S>(source: S, state: Arc<AppState>, sink: SinkDispatcher) -> IngestHandle
where
    S: SnapshotSource + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let actor = IngestActor {
        engine: ReconcileEngine::new(),
        state,
        sink,
    };
    let task = tokio::spawn(actor.run(source, shutdown_rx));
    IngestHandle {
        shutdown: Arc::new(shutdown_tx),
        task,
    }
}

struct IngestActor {
    engine: ReconcileEngine,
    state: Arc<AppState>,
    sink: SinkDispatcher,
}

impl IngestActor {
    async fn run<S>(mut self, mut source: S, mut shutdown: watch::Receiver<bool>)
    where
        S: SnapshotSource,
    {
        let source_name = source.name();
        info!(source = source_name, "ingest started");

        loop {
            if *shutdown.borrow() {
                info!("ingest shutdown requested");
                break;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("ingest shutdown handle dropped");
                        break;
                    }
                    continue;
                }
                next = source.next_snapshot() => next,
            };

            match next {
                None => {
                    info!(source = source_name, "snapshot source ended");
                    self.state.ingest.write().await.upstream = UpstreamHealth::Stopped;
                    break;
                }
                Some(Err(err)) => {
                    warn!(
                        source = source_name,
                        error = %err,
                        "upstream error; keeping last known state"
                    );
                    let mut st = self.state.ingest.write().await;
                    st.upstream = UpstreamHealth::Degraded;
                    st.source_errors += 1;
                    st.last_error = Some(err.to_string());
                }
                Some(Ok(raw)) => self.handle_snapshot(raw).await,
            }
        }

        self.state.hub.close();
        info!(
            generation = self.engine.cache().generation(),
            "ingest stopped; hub closed"
        );
    }

    async fn handle_snapshot(&mut self, raw: RawSnapshot) {
        let received_at = raw.received_at;

        let normalized = match normalize_snapshot(&raw.payload) {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "payload skipped; cache untouched");
                let mut st = self.state.ingest.write().await;
                st.upstream = UpstreamHealth::Healthy;
                st.snapshots_skipped += 1;
                return;
            }
        };

        let report = build_quality_report(&normalized);
        if report.is_clean() {
            debug!(%report, "snapshot quality");
        } else {
            warn!(%report, "snapshot quality issues");
            for dropped in &normalized.dropped {
                debug!(key = %dropped.key, reason = %dropped.reason, "camera entry dropped");
            }
        }

        // Wall-clock arrival order is not trustworthy, so only an upstream
        // stamp can mark a snapshot stale. Channel order is arrival order.
        let applied = match raw.observed_at {
            Some(observed_at) => self.engine.apply(observed_at, normalized.devices),
            None => Ok(self.engine.run_pass(normalized.devices)),
        };
        let pass = match applied {
            Ok(pass) => pass,
            Err(stale) => {
                warn!(error = %stale, "snapshot rejected");
                let mut st = self.state.ingest.write().await;
                st.upstream = UpstreamHealth::Healthy;
                st.snapshots_stale += 1;
                return;
            }
        };

        {
            let mut st = self.state.ingest.write().await;
            st.upstream = UpstreamHealth::Healthy;
            st.snapshots_applied += 1;
            st.entries_dropped += report.dropped_total() as u64;
            st.events_detected += pass.occurrences.len() as u64;
            st.last_snapshot_at = Some(received_at);
            st.last_error = None;
        }

        // Status is written before anything is published, so a subscriber
        // that sees this generation also sees its counters. Collection goes
        // out before events: an event subscriber that reads `current()` on
        // receipt sees the flagged state.
        self.state
            .hub
            .publish_collection(pass.generation, pass.collection.clone());

        for occurrence in &pass.occurrences {
            info!(
                device_id = %occurrence.device_id(),
                device_name = %occurrence.device.display_name(),
                start_time = %occurrence.start_time.to_rfc3339(),
                occurrence_id = %occurrence.occurrence_id,
                "new motion event"
            );
            self.state.hub.publish_event(occurrence.clone());
            self.sink.dispatch(occurrence.to_motion_event());
        }

        info!(
            generation = pass.generation,
            devices = pass.device_count(),
            added = pass.added.len(),
            removed = pass.removed.len(),
            events = pass.occurrences.len(),
            "snapshot applied"
        );
    }
}
