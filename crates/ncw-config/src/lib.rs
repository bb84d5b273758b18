//! Layered YAML configuration for the ncw daemon.
//!
//! Documents are deep-merged in order (later overrides earlier), converted to
//! JSON, checked for secret literals, then canonicalised and hashed so a run
//! can log exactly which effective config it used.
//!
//! Typed settings live in [`settings`]; environment-resolved secrets in
//! [`secrets`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_sink_endpoint, SinkEndpoint};
pub use settings::{DaemonSettings, HttpSettings, HubSettings, SinkKind, SinkSettings};

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading fails with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "AIza",       // Google API key (Firebase / device access projects)
    "ya29.",      // Google OAuth access token
    "1//",        // Google OAuth refresh token
    "sk-",        // OpenAI style
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
];

/// Config leaves the daemon actually reads.
///
/// "Consumed pointers" are JSON Pointer prefixes. A leaf under any consumed
/// prefix is consumed; any other leaf is reported as unused. Keep this in
/// step with [`settings::DaemonSettings`].
pub const DAEMON_CONSUMED_POINTERS: &[&str] = &[
    "/http/bind_addr",
    "/hub/event_buffer",
    "/sink/kind",
    "/sink/endpoint_env",
    "/sink/timeout_ms",
    "/sink/queue_capacity",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Registry the report was computed against, normalised and sorted.
    pub consumed_prefixes: Vec<String>,
    /// Leaves no registry entry covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Unused-key report against [`DAEMON_CONSUMED_POINTERS`].
/// `Fail` turns a non-clean report into an error; `Warn` always returns Ok.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    report_unused_keys_against(DAEMON_CONSUMED_POINTERS, config_json, policy)
}

pub fn report_unused_keys_against(
    consumed_pointers: &[&str],
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let registry: BTreeSet<Pointer> = consumed_pointers.iter().map(|p| Pointer::parse(p)).collect();

    let unused: BTreeSet<String> = leaves(config_json)
        .into_iter()
        .filter(|(leaf, _)| !registry.iter().any(|prefix| prefix.covers(leaf)))
        .map(|(leaf, _)| leaf.to_string())
        .collect();

    let report = UnusedKeyReport {
        consumed_prefixes: registry.iter().map(Pointer::to_string).collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) are not read by ncw-daemon; \
             remove them or register them in DAEMON_CONSUMED_POINTERS: {}",
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }

    Ok(report)
}

/// A JSON pointer held as unescaped segments. The root has no segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Pointer(Vec<String>);

impl Pointer {
    /// Lenient: a missing leading slash and trailing slashes are tolerated.
    fn parse(raw: &str) -> Self {
        Pointer(
            raw.trim()
                .split('/')
                .filter(|seg| !seg.is_empty())
                .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
                .collect(),
        )
    }

    fn child(&self, segment: impl Into<String>) -> Self {
        let mut segs = self.0.clone();
        segs.push(segment.into());
        Pointer(segs)
    }

    /// Segment-wise prefix: `/sink` covers `/sink/kind` but not `/sinks/kind`.
    fn covers(&self, leaf: &Pointer) -> bool {
        leaf.0.starts_with(&self.0)
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.0 {
            write!(f, "/{}", seg.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// Every scalar in the document with its pointer. Empty objects and arrays
/// contribute no leaves.
fn leaves(root: &Value) -> Vec<(Pointer, &Value)> {
    let mut out = Vec::new();
    let mut stack = vec![(Pointer(Vec::new()), root)];
    while let Some((at, value)) = stack.pop() {
        match value {
            Value::Object(map) => {
                stack.extend(map.iter().map(|(k, v)| (at.child(k.as_str()), v)));
            }
            Value::Array(items) => {
                stack.extend(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (at.child(i.to_string()), v)),
                );
            }
            scalar => out.push((at, scalar)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// sha256 of `canonical_json`, hex encoded.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn daemon_settings(&self) -> Result<DaemonSettings> {
        DaemonSettings::from_config_json(&self.config_json)
    }
}

/// Load and merge YAML files in order. No paths yields the empty config.
pub fn load_layered_yaml<P: AsRef<std::path::Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            fs::read_to_string(path)
                .with_context(|| format!("failed to read yaml path: {}", path.display()))
        })
        .collect::<Result<Vec<String>>>()?;

    let layers: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&layers)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {layer}"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("layer {layer} is not representable as json"))?;
        // An empty document parses to null; it contributes nothing.
        if !doc.is_null() {
            merge_into(&mut merged, doc);
        }
    }

    reject_secret_literals(&merged)?;

    // serde_json::Map is key-ordered (no preserve_order feature), so compact
    // serialization is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `overlay` replaces `base`.
fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn reject_secret_literals(doc: &Value) -> Result<()> {
    for (at, value) in leaves(doc) {
        let Some(text) = value.as_str() else {
            continue;
        };
        if has_secret_prefix(text) || looks_like_keyed_url(text) {
            bail!("CONFIG_SECRET_DETECTED leaf={at} value=REDACTED");
        }
    }
    Ok(())
}

fn has_secret_prefix(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Sink endpoints carry the project key in the URL; those belong in the
/// environment, not in YAML.
fn looks_like_keyed_url(s: &str) -> bool {
    let t = s.trim();
    (t.starts_with("http://") || t.starts_with("https://"))
        && (t.contains("key=") || t.contains("token="))
}
