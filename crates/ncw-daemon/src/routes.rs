//! Axum router and all HTTP handlers for ncw-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every route is read-only: state changes only through
//! the ingest actor.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::{
    api_types::{DevicesResponse, ErrorResponse, HealthResponse, StatusResponse},
    hub::{CollectionUpdate, CollectionSubscription, EventSubscription},
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/devices", get(devices))
        .route("/v1/devices/:id", get(device_by_id))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let current = st.hub.current();
    let ingest = st.ingest.read().await.clone();

    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            generation: current.generation,
            device_count: current.devices.len(),
            ingest,
            sink: st.sink_stats.snapshot(),
            hub_closed: st.hub.is_closed(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/devices, GET /v1/devices/:id
// ---------------------------------------------------------------------------

pub(crate) async fn devices(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let current = st.hub.current();
    (StatusCode::OK, Json(DevicesResponse::from(&current)))
}

pub(crate) async fn device_by_id(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let current = st.hub.current();
    match current.devices.iter().find(|d| d.id == id) {
        Some(device) => (StatusCode::OK, Json(device.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown device id '{id}'"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

/// `devices` events: current collection first, then each update.
/// `motion` events: live occurrences.
/// The stream ends when the hub closes.
pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let collections = st.hub.subscribe_collection();
    let events = st.hub.subscribe_events();
    debug!("sse subscriber attached");

    (
        headers,
        Sse::new(hub_to_sse(collections, events)).keep_alive(KeepAlive::new()),
    )
        .into_response()
}

fn hub_to_sse(
    collections: CollectionSubscription,
    events: EventSubscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let devices = collections
        .into_stream()
        .filter_map(|update| async move { devices_event(&update) });
    let motion = events.into_stream().filter_map(|occurrence| async move {
        let data = serde_json::to_string(&occurrence).ok()?;
        Some(Event::default().event("motion").data(data))
    });

    futures_util::stream::select(devices, motion).map(Ok)
}

fn devices_event(update: &CollectionUpdate) -> Option<Event> {
    let data = serde_json::to_string(&DevicesResponse::from(update)).ok()?;
    Some(Event::default().event("devices").data(data))
}
