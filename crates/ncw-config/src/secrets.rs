//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (`sink.endpoint_env`).
//! - At startup, callers invoke [`resolve_sink_endpoint`] once and pass the
//!   result into the sink constructor; nothing else reads the environment.
//! - `Debug` on secret-containing types **redacts** values.
//! - Error messages reference the env var **NAME**, never the value.
//!
//! The GraphQL sink endpoint carries the project key in its query string, so
//! the whole URL is treated as a secret.

use anyhow::{bail, Result};

use crate::settings::{SinkKind, SinkSettings};

/// Sink endpoint URL resolved from the environment. Redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SinkEndpoint(String);

impl SinkEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SinkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SinkEndpoint(<REDACTED>)")
    }
}

/// Resolve a named environment variable.
/// `None` if unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve the sink endpoint for the configured sink kind.
///
/// | kind      | endpoint |
/// |-----------|----------|
/// | `log`     | not needed, `Ok(None)` |
/// | `graphql` | **required**; missing env var is an error naming the var |
pub fn resolve_sink_endpoint(sink: &SinkSettings) -> Result<Option<SinkEndpoint>> {
    resolve_sink_endpoint_with(sink, resolve_env)
}

/// Same as [`resolve_sink_endpoint`] with an injectable lookup.
pub fn resolve_sink_endpoint_with<F>(sink: &SinkSettings, lookup: F) -> Result<Option<SinkEndpoint>>
where
    F: Fn(&str) -> Option<String>,
{
    match sink.kind {
        SinkKind::Log => Ok(None),
        SinkKind::Graphql => match lookup(&sink.endpoint_env) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(Some(SinkEndpoint(url)))
            }
            Some(_) => bail!(
                "SECRETS_INVALID sink=graphql: env var '{}' is not an http(s) URL",
                sink.endpoint_env
            ),
            None => bail!(
                "SECRETS_MISSING sink=graphql: required env var '{}' \
                 (sink endpoint) is not set or empty",
                sink.endpoint_env
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphql() -> SinkSettings {
        SinkSettings {
            kind: SinkKind::Graphql,
            endpoint_env: "TEST_SINK_URL".to_string(),
            ..SinkSettings::default()
        }
    }

    #[test]
    fn log_sink_needs_no_endpoint() {
        let r = resolve_sink_endpoint_with(&SinkSettings::default(), |_| None).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn graphql_sink_requires_endpoint_and_names_the_var() {
        let err = resolve_sink_endpoint_with(&graphql(), |_| None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TEST_SINK_URL"));
        assert!(msg.contains("SECRETS_MISSING"));
    }

    #[test]
    fn graphql_sink_resolves_by_name() {
        let r = resolve_sink_endpoint_with(&graphql(), |name| {
            (name == "TEST_SINK_URL").then(|| "https://h/graphql?key=s3cret".to_string())
        })
        .unwrap()
        .unwrap();
        assert_eq!(r.as_str(), "https://h/graphql?key=s3cret");
    }

    #[test]
    fn non_url_value_is_rejected_without_echoing_it() {
        let err = resolve_sink_endpoint_with(&graphql(), |_| Some("s3cret".to_string()))
            .unwrap_err();
        assert!(!err.to_string().contains("s3cret"));
    }

    #[test]
    fn debug_redacts_value() {
        let e = SinkEndpoint::new("https://h/graphql?key=s3cret");
        let dbg = format!("{e:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("REDACTED"));
    }
}
