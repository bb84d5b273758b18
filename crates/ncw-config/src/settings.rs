//! Typed daemon settings, deserialised from the merged config JSON.
//!
//! Every key has a default, so the empty config is a valid config.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub http: HttpSettings,
    pub hub: HubSettings,
    pub sink: SinkSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind_addr: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Motion-event broadcast buffer per subscriber.
    pub event_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self { event_buffer: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Graphql,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub kind: SinkKind,
    /// Name of the env var holding the endpoint URL. Never the URL itself.
    pub endpoint_env: String,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::Log,
            endpoint_env: "NCW_SINK_ENDPOINT".to_string(),
            timeout_ms: 5_000,
            queue_capacity: 128,
        }
    }
}

impl SinkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DaemonSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: DaemonSettings = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: daemon settings do not match the expected shape")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.hub.event_buffer == 0 {
            bail!("CONFIG_INVALID: hub.event_buffer must be > 0");
        }
        if self.sink.queue_capacity == 0 {
            bail!("CONFIG_INVALID: sink.queue_capacity must be > 0");
        }
        if self.sink.timeout_ms == 0 {
            bail!("CONFIG_INVALID: sink.timeout_ms must be > 0");
        }
        if self.sink.endpoint_env.trim().is_empty() {
            bail!("CONFIG_INVALID: sink.endpoint_env must name an environment variable");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http
            .bind_addr
            .parse()
            .with_context(|| format!("CONFIG_INVALID: http.bind_addr '{}'", self.http.bind_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let s = DaemonSettings::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(s, DaemonSettings::default());
        assert_eq!(s.sink.timeout(), Duration::from_secs(5));
        assert_eq!(s.bind_addr().unwrap().port(), 8787);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let s = DaemonSettings::from_config_json(&serde_json::json!({
            "sink": {"kind": "graphql"}
        }))
        .unwrap();
        assert_eq!(s.sink.kind, SinkKind::Graphql);
        assert_eq!(s.sink.queue_capacity, 128);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = DaemonSettings::from_config_json(&serde_json::json!({
            "hub": {"event_buffer": 0}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("hub.event_buffer"));
    }

    #[test]
    fn unknown_sink_kind_is_rejected() {
        assert!(DaemonSettings::from_config_json(&serde_json::json!({
            "sink": {"kind": "kafka"}
        }))
        .is_err());
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        assert!(DaemonSettings::from_config_json(&serde_json::json!({
            "http": {"bind_addr": "not-an-addr"}
        }))
        .is_err());
    }
}
