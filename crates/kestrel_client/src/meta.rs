//! Meta resolver: fetches partition maps from the meta servers.
//!
//! Meta endpoints are tried in round-robin order on transport faults. A
//! meta-level "not primary" answer advances the cursor to the hinted leader
//! when one is named, otherwise rotates. Forced refreshes are single-flight
//! per table: concurrent callers join the in-flight resolve and all see the
//! same result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use kestrel_common::{ErrorKind, KestrelError, KestrelResult};
use kestrel_proto::types::{
    self as wire, QueryConfigRequest, RequestBody, ResponseBody,
};

use crate::pool::SessionPool;
use crate::table::PartitionTable;

type RefreshWaiter = oneshot::Sender<KestrelResult<Arc<PartitionTable>>>;

pub struct MetaResolver {
    meta_servers: Vec<String>,
    cursor: AtomicUsize,
    pool: Arc<SessionPool>,
    /// Per-query_config deadline; one resolve may spend this once per meta.
    query_timeout: Duration,
    inflight: Mutex<HashMap<String, Vec<RefreshWaiter>>>,
}

impl MetaResolver {
    pub fn new(meta_servers: Vec<String>, pool: Arc<SessionPool>, query_timeout: Duration) -> Self {
        Self {
            meta_servers,
            cursor: AtomicUsize::new(0),
            pool,
            query_timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn current_meta(&self) -> &str {
        let index = self.cursor.load(Ordering::Relaxed) % self.meta_servers.len();
        &self.meta_servers[index]
    }

    fn rotate(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }

    /// Point the cursor at the hinted leader, or rotate when the hint is
    /// absent or names an endpoint outside the configured list.
    fn follow_hint(&self, hint: &str) {
        if hint.is_empty() {
            self.rotate();
            return;
        }
        match self.meta_servers.iter().position(|m| m == hint) {
            Some(index) => {
                tracing::debug!(hint = %hint, "following meta primary hint");
                self.cursor.store(index, Ordering::Relaxed);
            }
            None => {
                tracing::debug!(hint = %hint, "meta hint not in configured list, rotating");
                self.rotate();
            }
        }
    }

    /// Fetch the table's partition map, failing over across meta servers.
    ///
    /// Transport faults and "not primary" answers move to the next
    /// candidate; each endpoint gets a bounded number of tries per resolve
    /// so a fully unreachable quorum fails in bounded time.
    pub async fn resolve(&self, table_name: &str) -> KestrelResult<Arc<PartitionTable>> {
        if self.meta_servers.is_empty() {
            return Err(KestrelError::Config(
                "no meta servers configured".into(),
            ));
        }
        let mut last_err =
            KestrelError::connection("meta", "no meta server could be reached");
        let attempts = self.meta_servers.len() * 2;

        for _ in 0..attempts {
            let endpoint = self.current_meta().to_string();
            let session = self.pool.get(&endpoint);
            let request = RequestBody::QueryConfig(QueryConfigRequest {
                table_name: table_name.to_string(),
            });

            match session.call(&request, self.query_timeout).await {
                Ok(ResponseBody::QueryConfig(resp)) => match resp.status {
                    wire::META_OK => {
                        return PartitionTable::from_response(table_name, resp).map(Arc::new);
                    }
                    wire::META_TABLE_NOT_FOUND => {
                        return Err(KestrelError::invalid_argument(format!(
                            "table not found: {table_name}"
                        )));
                    }
                    wire::META_NOT_PRIMARY => {
                        tracing::debug!(meta = %endpoint, "meta server is not primary");
                        last_err = KestrelError::routing_stale(
                            format!("meta server {endpoint} is not primary"),
                            if resp.hinted_primary.is_empty() {
                                None
                            } else {
                                Some(resp.hinted_primary.clone())
                            },
                        );
                        self.follow_hint(&resp.hinted_primary);
                    }
                    wire::META_BUSY => {
                        tracing::debug!(meta = %endpoint, "meta server busy, rotating");
                        last_err =
                            KestrelError::connection(&endpoint, "meta server busy");
                        self.rotate();
                    }
                    other => {
                        return Err(KestrelError::Proto(format!(
                            "unknown meta status {other} from {endpoint}"
                        )));
                    }
                },
                Ok(_) => {
                    return Err(KestrelError::Proto(format!(
                        "unexpected reply to query_config from {endpoint}"
                    )));
                }
                Err(e) if matches!(e.kind(), ErrorKind::Connection | ErrorKind::Timeout) => {
                    tracing::debug!(meta = %endpoint, error = %e, "meta server unreachable, rotating");
                    last_err = e;
                    self.rotate();
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// Forced refresh, rate-limited to one in-flight resolve per table.
    /// Late joiners receive the same result as the leader.
    pub async fn refresh(&self, table_name: &str) -> KestrelResult<Arc<PartitionTable>> {
        let (tx, rx) = oneshot::channel();
        let is_leader = {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(table_name) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    inflight.insert(table_name.to_string(), vec![tx]);
                    true
                }
            }
        };

        if is_leader {
            let result = self.resolve(table_name).await;
            let waiters = self
                .inflight
                .lock()
                .remove(table_name)
                .unwrap_or_default();
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(KestrelError::Cancelled),
        }
    }

    /// Configured meta endpoints (for diagnostics).
    pub fn meta_servers(&self) -> &[String] {
        &self.meta_servers
    }
}
