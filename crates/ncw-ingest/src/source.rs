//! Snapshot source boundary.
//!
//! The core only needs "deliver the next raw payload". How the payload got
//! here (REST stream, file replay, test harness) is the implementation's
//! business.

use std::fmt;
use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Raw snapshot
// ---------------------------------------------------------------------------

/// One upstream document exactly as delivered, stamped with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    /// Local wall clock on arrival. Reported in status only; the wall clock
    /// can step backwards, so it never orders snapshots.
    pub received_at: DateTime<Utc>,
    /// The upstream's own stamp, when it supplies one. Only stamped
    /// snapshots go through the freshness watermark.
    pub observed_at: Option<DateTime<Utc>>,
    pub payload: Value,
}

impl RawSnapshot {
    pub fn now(payload: Value) -> Self {
        Self::at(Utc::now(), payload)
    }

    /// Unstamped snapshot that arrived at `received_at`.
    pub fn at(received_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            received_at,
            observed_at: None,
            payload,
        }
    }

    /// Snapshot carrying the upstream's own stamp, arriving now.
    pub fn observed(observed_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            received_at: Utc::now(),
            observed_at: Some(observed_at),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Recoverable upstream failures. The consumer keeps its last state and asks
/// for the next snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network / IO failure while reading the stream.
    Transport(String),
    /// A payload arrived but was not valid JSON.
    Decode { line: Option<usize>, message: String },
    /// The upstream closed the stream and is expected to come back.
    Disconnected(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Decode {
                line: Some(n),
                message,
            } => write!(f, "decode error at line {n}: {message}"),
            SourceError::Decode {
                line: None,
                message,
            } => write!(f, "decode error: {message}"),
            SourceError::Disconnected(msg) => write!(f, "upstream disconnected: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Stream of raw snapshots.
///
/// `None` means the stream is finished for good; `Some(Err(_))` is a
/// transient failure and the caller may keep polling.
#[async_trait::async_trait]
pub trait SnapshotSource: Send {
    /// Short name for logs (e.g. `"channel"`, `"jsonl"`).
    fn name(&self) -> &'static str;

    async fn next_snapshot(&mut self) -> Option<Result<RawSnapshot, SourceError>>;
}

// ---------------------------------------------------------------------------
// In-process channel source
// ---------------------------------------------------------------------------

/// Producer half of [`channel_source`]. Dropping every feed ends the source.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    tx: mpsc::Sender<Result<RawSnapshot, SourceError>>,
}

impl SnapshotFeed {
    /// Push a payload stamped with the current time.
    pub async fn push(&self, payload: Value) -> Result<(), SourceError> {
        self.send(Ok(RawSnapshot::now(payload))).await
    }

    /// Push a pre-stamped snapshot.
    pub async fn push_snapshot(&self, snapshot: RawSnapshot) -> Result<(), SourceError> {
        self.send(Ok(snapshot)).await
    }

    /// Report an upstream failure to the consumer.
    pub async fn fail(&self, err: SourceError) -> Result<(), SourceError> {
        self.send(Err(err)).await
    }

    async fn send(&self, item: Result<RawSnapshot, SourceError>) -> Result<(), SourceError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| SourceError::Disconnected("snapshot consumer is gone".to_string()))
    }
}

/// Consumer half of [`channel_source`].
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<RawSnapshot, SourceError>>,
}

/// Bounded in-process source. The feed waits when `capacity` payloads are
/// queued, so a slow reconciler applies backpressure to the producer.
pub fn channel_source(capacity: usize) -> (SnapshotFeed, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SnapshotFeed { tx }, ChannelSource { rx })
}

#[async_trait::async_trait]
impl SnapshotSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next_snapshot(&mut self) -> Option<Result<RawSnapshot, SourceError>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// JSON-lines source
// ---------------------------------------------------------------------------

/// One JSON document per line from any async reader (recorded file, socket).
///
/// Blank lines are skipped. A line that is not JSON yields
/// `SourceError::Decode` and reading continues with the next line.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    /// Replay a recorded snapshot file.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait::async_trait]
impl<R> SnapshotSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn next_snapshot(&mut self) -> Option<Result<RawSnapshot, SourceError>> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    self.line_no += 1;
                    if let Some(item) = parse_line(&line, self.line_no) {
                        return Some(item);
                    }
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(SourceError::Transport(e.to_string()))),
            }
        }
    }
}

/// `None` for a blank line.
fn parse_line(line: &str, line_no: usize) -> Option<Result<RawSnapshot, SourceError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<Value>(trimmed)
            .map(RawSnapshot::now)
            .map_err(|e| SourceError::Decode {
                line: Some(line_no),
                message: e.to_string(),
            }),
    )
}

// ---------------------------------------------------------------------------
// Blocking reader thread
// ---------------------------------------------------------------------------

/// JSON lines read from a blocking reader on a dedicated OS thread.
///
/// The thread is detached: a read that never returns (an idle stdin) does
/// not hold up runtime shutdown. It exits at EOF, after a read error, or
/// once the returned source is dropped and the next line has been read.
pub fn spawn_line_reader<R>(reader: R, capacity: usize) -> std::io::Result<ChannelSource>
where
    R: BufRead + Send + 'static,
{
    let (feed, source) = channel_source(capacity);
    std::thread::Builder::new()
        .name("ncw-line-reader".into())
        .spawn(move || forward_lines(reader, feed))?;
    Ok(source)
}

/// Snapshots from the process's standard input.
pub fn stdin_source(capacity: usize) -> std::io::Result<ChannelSource> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()), capacity)
}

fn forward_lines<R: BufRead>(reader: R, feed: SnapshotFeed) {
    for (idx, line) in reader.lines().enumerate() {
        let item = match line {
            Ok(line) => match parse_line(&line, idx + 1) {
                Some(item) => item,
                None => continue,
            },
            Err(e) => {
                let _ = feed.tx.blocking_send(Err(SourceError::Transport(e.to_string())));
                break;
            }
        };
        if feed.tx.blocking_send(item).is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
