//! External event sink: remote motion-event log.
//!
//! Delivery is fire-and-forget. The ingest actor hands each
//! [`MotionEventRecord`] to a [`SinkDispatcher`], which queues it for a
//! single worker task. The worker calls the sink with a per-call timeout.
//!
//! - A full queue drops the record with a warning; the pass never waits.
//! - Failures and timeouts are logged and counted, never retried.
//! - Nothing here can reach back into reconciliation or the hub.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ncw_config::SinkEndpoint;
use ncw_schemas::MotionEventRecord;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// HTTP 401 from the sink.
    Unauthorized,
    /// Any other non-2xx status.
    Http { status: u16 },
    /// The sink answered 2xx but refused the record (GraphQL `errors`).
    Rejected(String),
    /// Connection / IO failure. Never contains the endpoint URL.
    Transport(String),
    /// The call did not finish within the dispatcher timeout.
    Timeout(Duration),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Unauthorized => write!(f, "sink rejected credentials (401)"),
            SinkError::Http { status } => write!(f, "sink http error status={status}"),
            SinkError::Rejected(msg) => write!(f, "sink rejected event: {msg}"),
            SinkError::Transport(msg) => write!(f, "sink transport error: {msg}"),
            SinkError::Timeout(t) => write!(f, "sink call timed out after {}ms", t.as_millis()),
        }
    }
}

impl std::error::Error for SinkError {}

// ---------------------------------------------------------------------------
// Sink trait + implementations
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record_event(&self, event: &MotionEventRecord) -> Result<(), SinkError>;
}

/// Logs each event. Used when no remote endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn record_event(&self, event: &MotionEventRecord) -> Result<(), SinkError> {
        info!(
            device_id = %event.device_id,
            device_name = %event.device_name,
            start_time = %event.start_time.to_rfc3339(),
            has_motion = event.has_motion,
            image_url = event.image_url.as_deref().unwrap_or(""),
            "motion event recorded"
        );
        Ok(())
    }
}

const CREATE_MOTION_EVENT: &str = "mutation createMotionEvent($cameraId: String!, $cameraName: String!, $eventDate: DateTime!, $image: String!) { createMotionEvent(cameraId: $cameraId, cameraName: $cameraName, eventDate: $eventDate, image: $image) { id } }";

/// Posts `createMotionEvent` to a GraphQL endpoint.
///
/// The endpoint URL carries the project key; it is never logged.
#[derive(Debug, Clone)]
pub struct GraphQlSink {
    endpoint: SinkEndpoint,
    http: reqwest::Client,
}

impl GraphQlSink {
    pub fn new(endpoint: SinkEndpoint) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    fn request_body(event: &MotionEventRecord) -> serde_json::Value {
        json!({
            "query": CREATE_MOTION_EVENT,
            "variables": {
                "cameraId": event.device_id,
                "cameraName": event.device_name,
                "eventDate": event.start_time.to_rfc3339(),
                "image": event.image_url.as_deref().unwrap_or(""),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[async_trait::async_trait]
impl EventSink for GraphQlSink {
    fn name(&self) -> &'static str {
        "graphql"
    }

    async fn record_event(&self, event: &MotionEventRecord) -> Result<(), SinkError> {
        let resp = self
            .http
            .post(self.endpoint.as_str())
            .json(&Self::request_body(event))
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SinkError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SinkError::Http {
                status: status.as_u16(),
            });
        }

        let body: GraphQlResponse = resp
            .json()
            .await
            .map_err(|e| SinkError::Rejected(format!("invalid response body: {}", e.without_url())))?;

        if body.errors.is_empty() {
            Ok(())
        } else {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            Err(SinkError::Rejected(messages.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Delivery counters, shared with the status endpoint.
#[derive(Debug, Default)]
pub struct SinkStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStatsSnapshot {
    pub delivered: u64,
    pub failed: u64,
    /// Dropped because the queue was full or the worker was gone.
    pub dropped: u64,
}

impl SinkStats {
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Non-blocking handle to the sink worker. Dropping every handle lets the
/// worker drain its queue and exit.
#[derive(Debug, Clone)]
pub struct SinkDispatcher {
    tx: mpsc::Sender<MotionEventRecord>,
    stats: Arc<SinkStats>,
}

impl SinkDispatcher {
    /// Queue one record. Never waits; returns `false` if it was dropped.
    pub fn dispatch(&self, event: MotionEventRecord) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(device_id = %ev.device_id, "sink queue full; motion event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(device_id = %ev.device_id, "sink worker stopped; motion event dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        Arc::clone(&self.stats)
    }
}

/// Spawn the sink worker. `queue_capacity` bounds pending records; `timeout`
/// bounds each sink call.
pub fn spawn_sink_dispatcher(
    sink: Arc<dyn EventSink>,
    queue_capacity: usize,
    timeout: Duration,
) -> (SinkDispatcher, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<MotionEventRecord>(queue_capacity.max(1));
    let stats = Arc::new(SinkStats::default());
    let worker_stats = Arc::clone(&stats);

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let outcome = match tokio::time::timeout(timeout, sink.record_event(&event)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(timeout)),
            };
            match outcome {
                Ok(()) => {
                    worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(sink = sink.name(), device_id = %event.device_id, "sink delivered");
                }
                Err(err) => {
                    worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        sink = sink.name(),
                        device_id = %event.device_id,
                        error = %err,
                        "sink delivery failed; not retried"
                    );
                }
            }
        }
        debug!(sink = sink.name(), "sink worker stopped");
    });

    (SinkDispatcher { tx, stats }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str) -> MotionEventRecord {
        MotionEventRecord {
            device_id: id.to_string(),
            device_name: format!("{id} cam"),
            start_time: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
            image_url: None,
            has_motion: true,
        }
    }

    #[test]
    fn graphql_body_carries_all_variables() {
        let mut r = record("A");
        r.image_url = Some("https://img/a.jpg".to_string());
        let body = GraphQlSink::request_body(&r);
        assert!(body["query"].as_str().unwrap().contains("createMotionEvent"));
        assert_eq!(body["variables"]["cameraId"], "A");
        assert_eq!(body["variables"]["cameraName"], "A cam");
        assert_eq!(body["variables"]["eventDate"], "2023-11-14T22:13:20+00:00");
        assert_eq!(body["variables"]["image"], "https://img/a.jpg");
    }

    #[test]
    fn missing_image_is_sent_as_empty_string() {
        let body = GraphQlSink::request_body(&record("A"));
        assert_eq!(body["variables"]["image"], "");
    }

    #[tokio::test]
    async fn dispatcher_drains_queue_after_last_handle_drops() {
        let (dispatcher, worker) =
            spawn_sink_dispatcher(Arc::new(LogSink), 4, Duration::from_secs(1));
        let stats = dispatcher.stats();
        assert!(dispatcher.dispatch(record("A")));
        assert!(dispatcher.dispatch(record("B")));
        drop(dispatcher);
        worker.await.unwrap();
        assert_eq!(stats.snapshot().delivered, 2);
    }
}
