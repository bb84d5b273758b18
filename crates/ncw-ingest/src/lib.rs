//! ncw-ingest
//!
//! Upstream boundary for camera snapshots.
//!
//! This crate owns the source abstraction ([`source`]), the conversion of one
//! raw upstream document into canonical [`ncw_schemas::DeviceRecord`]s
//! ([`normalizer`]), the public-share string derivation ([`view`]) and the
//! per-snapshot data-quality report ([`quality`]).
//!
//! It does **not** compare snapshots or keep state between them; that is
//! `ncw-reconcile`.

pub mod normalizer;
pub mod quality;
pub mod source;
pub mod view;

pub use normalizer::{
    normalize_camera, normalize_snapshot, DropReason, DroppedEntry, NormalizeError,
    NormalizedSnapshot, TimestampIssue,
};
pub use quality::{build_quality_report, InvertedEvent, QualityReport};
pub use source::{
    channel_source, spawn_line_reader, stdin_source, ChannelSource, JsonLinesSource, RawSnapshot,
    SnapshotFeed, SnapshotSource, SourceError,
};
