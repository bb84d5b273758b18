//! ncw-daemon entry point.
//!
//! This file is intentionally thin: it loads config, sets up tracing, builds
//! the shared state, starts the sink worker and the ingest actor, wires
//! middleware, and serves HTTP. Route handlers live in `routes.rs`; the
//! reconciliation loop lives in `ingest.rs`.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use ncw_config::{
    load_layered_yaml, report_unused_keys, resolve_sink_endpoint, SinkKind, UnusedKeyPolicy,
};
use ncw_daemon::{
    ingest::{spawn_ingest, IngestHandle},
    routes,
    sink::{spawn_sink_dispatcher, EventSink, GraphQlSink, LogSink, SinkDispatcher},
    state::AppState,
};
use ncw_ingest::{stdin_source, JsonLinesSource};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[derive(Debug, Parser)]
#[command(name = "ncw-daemon", about = "Nest camera state reconciliation daemon")]
struct Args {
    /// YAML config layer; repeat to layer (later overrides earlier).
    #[arg(long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,

    /// Replay snapshots from a JSON-lines file instead of reading stdin.
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing;
    // production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let args = Args::parse();

    let loaded = load_layered_yaml(args.config.as_slice()).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, layers = args.config.len(), "config loaded");

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &unused.unused_leaf_pointers {
        warn!(key = %pointer, "config key is not read by ncw-daemon");
    }

    let settings = loaded.daemon_settings()?;

    let sink: Arc<dyn EventSink> = match settings.sink.kind {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Graphql => {
            let endpoint = resolve_sink_endpoint(&settings.sink)?
                .context("graphql sink selected but no endpoint resolved")?;
            Arc::new(GraphQlSink::new(endpoint))
        }
    };
    info!(sink = sink.name(), timeout_ms = settings.sink.timeout_ms, "sink configured");

    let (dispatcher, sink_worker) = spawn_sink_dispatcher(
        sink,
        settings.sink.queue_capacity,
        settings.sink.timeout(),
    );

    let shared =
        Arc::new(AppState::new(settings.hub.event_buffer).with_sink_stats(dispatcher.stats()));

    let ingest = start_ingest(args.replay.as_deref(), Arc::clone(&shared), dispatcher).await?;
    let stopper = ingest.stopper();

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => settings.bind_addr()?,
    };
    info!("ncw-daemon listening on http://{}", addr);

    // Stopping ingest closes the hub, which ends open SSE streams so the
    // graceful shutdown can complete.
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            stopper.stop();
        })
        .await
        .context("server crashed")?;

    ingest.shutdown().await;
    if let Err(e) = sink_worker.await {
        warn!(error = %e, "sink worker ended abnormally");
    }
    info!("ncw-daemon stopped");

    Ok(())
}

/// Lines buffered between the stdin thread and the ingest actor.
const STDIN_QUEUE: usize = 16;

async fn start_ingest(
    replay: Option<&std::path::Path>,
    state: Arc<AppState>,
    dispatcher: SinkDispatcher,
) -> anyhow::Result<IngestHandle> {
    let handle = match replay {
        Some(path) => {
            let source = JsonLinesSource::open(path)
                .await
                .with_context(|| format!("failed to open replay file: {}", path.display()))?;
            info!(file = %path.display(), "replaying snapshots");
            spawn_ingest(source, state, dispatcher)
        }
        None => {
            let source = stdin_source(STDIN_QUEUE).context("failed to start stdin reader")?;
            info!("reading snapshots from stdin (one JSON document per line)");
            spawn_ingest(source, state, dispatcher)
        }
    };
    Ok(handle)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("NCW_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
