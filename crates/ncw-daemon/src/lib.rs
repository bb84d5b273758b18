//! ncw-daemon library target.
//!
//! Exposes the hub, ingest actor, sink dispatcher and router for integration
//! tests. The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod hub;
pub mod ingest;
pub mod routes;
pub mod sink;
pub mod state;
