//! Perf counters, recorded through the `metrics` facade.
//!
//! The client never installs a recorder; wiring an exporter is the host
//! application's job. Recording is a no-op unless `enable_perf_counter`
//! is set, and every sample carries the configured opaque tag string.

use std::time::Duration;

pub(crate) struct PerfCounters {
    enabled: bool,
    tags: String,
}

impl PerfCounters {
    pub fn new(enabled: bool, tags: String) -> Self {
        Self { enabled, tags }
    }

    /// One logical operation finished (after all internal retries).
    pub fn record_op(&self, method: &'static str, elapsed: Duration, ok: bool) {
        if !self.enabled {
            return;
        }
        metrics::counter!(
            "kestrel_client_ops_total",
            "method" => method,
            "ok" => if ok { "true" } else { "false" },
            "tags" => self.tags.clone()
        )
        .increment(1);
        metrics::histogram!(
            "kestrel_client_op_duration_us",
            "method" => method,
            "tags" => self.tags.clone()
        )
        .record(elapsed.as_micros() as f64);
    }

    /// One internal retry, by cause ("transport" or "routing").
    pub fn record_retry(&self, method: &'static str, cause: &'static str) {
        if !self.enabled {
            return;
        }
        metrics::counter!(
            "kestrel_client_retries_total",
            "method" => method,
            "cause" => cause,
            "tags" => self.tags.clone()
        )
        .increment(1);
    }

    /// One partition-map refresh triggered by a routing error.
    pub fn record_refresh(&self, table: &str) {
        if !self.enabled {
            return;
        }
        metrics::counter!(
            "kestrel_client_meta_refreshes_total",
            "table" => table.to_string(),
            "tags" => self.tags.clone()
        )
        .increment(1);
    }
}
