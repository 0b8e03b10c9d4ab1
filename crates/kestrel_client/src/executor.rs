//! Operation executor: runs one logical request to completion.
//!
//! Route → dispatch → classify. Transport faults are retried against the
//! same route with exponential backoff; routing errors trigger a partition
//! map refresh and a re-route; application errors surface immediately. The
//! caller's deadline bounds everything, backoff sleeps included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time;

use kestrel_common::types::Gpid;
use kestrel_common::{ErrorKind, KestrelError, KestrelResult};
use kestrel_proto::types::{RequestBody, ResponseBody};

use crate::metrics::PerfCounters;
use crate::pool::SessionPool;
use crate::table::TableHandle;

/// First backoff after a transport fault.
const INITIAL_BACKOFF: Duration = Duration::from_millis(20);
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_millis(500);
/// Transport retries per logical operation before the fault surfaces.
const MAX_TRANSPORT_RETRIES: u32 = 3;
/// Longest the executor waits on one meta refresh before re-routing anyway.
const REFRESH_WAIT: Duration = Duration::from_secs(2);
/// Pause between re-route attempts while a partition has no primary.
const NO_PRIMARY_PAUSE: Duration = Duration::from_millis(10);

/// How a request selects its partition.
#[derive(Debug, Clone, Copy)]
pub enum RouteSpec {
    /// Partition from `hash mod partition_count` (point operations).
    Hash(u64),
    /// Explicit partition index (scan cursors).
    Index(u32),
}

/// Shared execution engine: owns the session pool and the retry policy.
pub struct OpRunner {
    pool: Arc<SessionPool>,
    default_timeout: Duration,
    perf: PerfCounters,
}

impl OpRunner {
    pub(crate) fn new(pool: Arc<SessionPool>, default_timeout: Duration, perf: PerfCounters) -> Self {
        Self {
            pool,
            default_timeout,
            perf,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute one logical request against `table`.
    ///
    /// `build` produces the request body for a given gpid; it runs once per
    /// attempt because a refresh may change the partition count and with it
    /// the partition index.
    pub async fn execute<F>(
        &self,
        table: &TableHandle,
        route: RouteSpec,
        deadline: Duration,
        build: F,
    ) -> KestrelResult<ResponseBody>
    where
        F: Fn(Gpid) -> RequestBody,
    {
        let budget = if deadline.is_zero() {
            self.default_timeout
        } else {
            deadline
        };
        let deadline_at = Instant::now() + budget;
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut transport_retries = 0u32;
        // Until the first dispatch we have no body to name the op after.
        let mut method: &'static str = "operation";

        loop {
            let Some(remaining) = deadline_at.checked_duration_since(Instant::now()) else {
                self.perf.record_op(method, started.elapsed(), false);
                return Err(KestrelError::Timeout(method.to_string()));
            };
            if remaining.is_zero() {
                self.perf.record_op(method, started.elapsed(), false);
                return Err(KestrelError::Timeout(method.to_string()));
            }

            let routed = match route {
                RouteSpec::Hash(hash) => table.route(hash),
                RouteSpec::Index(index) => table.route_index(index).map(|ep| (index, ep)),
            };
            let (partition_index, endpoint) = match routed {
                Ok(target) => target,
                Err(e) if e.is_routing_stale() => {
                    // No primary known for the partition: wait for a
                    // refresh, pause briefly so a primary-less partition
                    // does not spin the meta servers, then re-route.
                    self.refresh_within(table, deadline_at).await;
                    let pause = NO_PRIMARY_PAUSE
                        .min(deadline_at.saturating_duration_since(Instant::now()));
                    if !pause.is_zero() {
                        time::sleep(pause).await;
                    }
                    continue;
                }
                Err(e) => {
                    self.perf.record_op(method, started.elapsed(), false);
                    return Err(e);
                }
            };

            let body = build(Gpid::new(table.table_id(), partition_index));
            method = body.method();
            let session = self.pool.get(&endpoint);

            match session.call(&body, remaining).await {
                Ok(response) => {
                    self.perf.record_op(method, started.elapsed(), true);
                    return Ok(response);
                }
                Err(e) => match e.kind() {
                    ErrorKind::Connection => {
                        transport_retries += 1;
                        if transport_retries > MAX_TRANSPORT_RETRIES {
                            self.perf.record_op(method, started.elapsed(), false);
                            return Err(e);
                        }
                        tracing::debug!(
                            table = %table.name(),
                            endpoint = %endpoint,
                            method = method,
                            attempt = transport_retries,
                            error = %e,
                            "transport fault, backing off"
                        );
                        self.perf.record_retry(method, "transport");
                        let pause = backoff
                            .min(deadline_at.saturating_duration_since(Instant::now()));
                        if !pause.is_zero() {
                            time::sleep(pause).await;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                    ErrorKind::RoutingStale => {
                        tracing::debug!(
                            table = %table.name(),
                            partition = partition_index,
                            endpoint = %endpoint,
                            error = %e,
                            "routing stale, refreshing partition map"
                        );
                        self.perf.record_retry(method, "routing");
                        self.refresh_within(table, deadline_at).await;
                    }
                    _ => {
                        self.perf.record_op(method, started.elapsed(), false);
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Await a single-flight refresh, bounded by the operation deadline.
    /// Failures and timeouts are tolerated: the caller re-routes against
    /// whatever snapshot is current and the loop's deadline check decides.
    async fn refresh_within(&self, table: &TableHandle, deadline_at: Instant) {
        let remaining = deadline_at.saturating_duration_since(Instant::now());
        let wait = remaining.min(REFRESH_WAIT);
        if wait.is_zero() {
            return;
        }
        self.perf.record_refresh(table.name());
        match time::timeout(wait, table.refresh()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(table = %table.name(), error = %e, "partition map refresh failed");
            }
            Err(_) => {
                tracing::debug!(table = %table.name(), "partition map refresh still in flight");
            }
        }
    }
}
