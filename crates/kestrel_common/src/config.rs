//! Client configuration.
//!
//! The configuration *loader* (zk:// / file:// / resource:// paths) lives
//! outside this crate and produces a flat string property map; this module
//! turns that map — or a serde-deserialized document — into a validated
//! [`ClientConfig`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KestrelError, KestrelResult};

/// Property key: comma-separated `host:port` list of meta servers.
pub const KEY_META_SERVERS: &str = "meta_servers";
/// Property key: default per-operation deadline in milliseconds.
pub const KEY_OPERATION_TIMEOUT_MS: &str = "operation_timeout_ms";
/// Property key: worker pool size for the blocking wrappers.
pub const KEY_ASYNC_WORKERS: &str = "async_workers";
/// Property key: whether to record perf counters.
pub const KEY_ENABLE_PERF_COUNTER: &str = "enable_perf_counter";
/// Property key: opaque tag string attached to perf counters.
pub const KEY_PERF_COUNTER_TAGS: &str = "perf_counter_tags";

fn default_operation_timeout_ms() -> u64 {
    1000
}

fn default_async_workers() -> usize {
    4
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Meta server endpoints, e.g. `["10.0.0.1:34601", "10.0.0.2:34601"]`.
    pub meta_servers: Vec<String>,
    /// Default per-operation deadline in milliseconds (0 is rejected).
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Worker pool size used by the blocking wrappers.
    #[serde(default = "default_async_workers")]
    pub async_workers: usize,
    /// Record perf counters through the `metrics` facade.
    #[serde(default)]
    pub enable_perf_counter: bool,
    /// Opaque tag string attached to every perf counter.
    #[serde(default)]
    pub perf_counter_tags: String,
}

impl ClientConfig {
    /// Build a config pointing at the given meta servers, defaults elsewhere.
    pub fn new(meta_servers: Vec<String>) -> Self {
        Self {
            meta_servers,
            operation_timeout_ms: default_operation_timeout_ms(),
            async_workers: default_async_workers(),
            enable_perf_counter: false,
            perf_counter_tags: String::new(),
        }
    }

    /// Build a config from the external loader's flat property map.
    /// Unknown keys are ignored; malformed values are rejected.
    pub fn from_properties(props: &HashMap<String, String>) -> KestrelResult<Self> {
        let meta_servers = props
            .get(KEY_META_SERVERS)
            .map(|s| {
                s.split(',')
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut config = Self::new(meta_servers);

        if let Some(v) = props.get(KEY_OPERATION_TIMEOUT_MS) {
            config.operation_timeout_ms = v.parse().map_err(|_| {
                KestrelError::Config(format!("{KEY_OPERATION_TIMEOUT_MS}: not an integer: {v:?}"))
            })?;
        }
        if let Some(v) = props.get(KEY_ASYNC_WORKERS) {
            config.async_workers = v.parse().map_err(|_| {
                KestrelError::Config(format!("{KEY_ASYNC_WORKERS}: not an integer: {v:?}"))
            })?;
        }
        if let Some(v) = props.get(KEY_ENABLE_PERF_COUNTER) {
            config.enable_perf_counter = v.parse().map_err(|_| {
                KestrelError::Config(format!("{KEY_ENABLE_PERF_COUNTER}: not a boolean: {v:?}"))
            })?;
        }
        if let Some(v) = props.get(KEY_PERF_COUNTER_TAGS) {
            config.perf_counter_tags = v.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the runtime cannot operate with.
    pub fn validate(&self) -> KestrelResult<()> {
        if self.meta_servers.is_empty() {
            return Err(KestrelError::Config(format!(
                "{KEY_META_SERVERS} must list at least one host:port"
            )));
        }
        for endpoint in &self.meta_servers {
            if !endpoint.contains(':') {
                return Err(KestrelError::Config(format!(
                    "{KEY_META_SERVERS}: malformed endpoint {endpoint:?} (expected host:port)"
                )));
            }
        }
        if self.operation_timeout_ms == 0 {
            return Err(KestrelError::Config(format!(
                "{KEY_OPERATION_TIMEOUT_MS} must be positive"
            )));
        }
        if self.async_workers == 0 {
            return Err(KestrelError::Config(format!(
                "{KEY_ASYNC_WORKERS} must be positive"
            )));
        }
        Ok(())
    }

    /// Default per-operation deadline.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// One `key=value` line per recognized key, for startup logging.
    pub fn summary(&self) -> String {
        format!(
            "{KEY_META_SERVERS}={}\n{KEY_OPERATION_TIMEOUT_MS}={}\n{KEY_ASYNC_WORKERS}={}\n\
             {KEY_ENABLE_PERF_COUNTER}={}\n{KEY_PERF_COUNTER_TAGS}={}",
            self.meta_servers.join(","),
            self.operation_timeout_ms,
            self.async_workers,
            self.enable_perf_counter,
            self.perf_counter_tags,
        )
    }
}
