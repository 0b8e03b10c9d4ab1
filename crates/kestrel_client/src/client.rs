//! Client facade: named operations over tables.
//!
//! [`KestrelClient`] interns one [`Table`] per table name and exposes the
//! operation surface as thin adapters over the executor, batch and scan
//! engines. Closing the client cancels every session and refuses further
//! calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use kestrel_common::types::TableId;
use kestrel_common::{ClientConfig, KestrelError, KestrelResult};
use kestrel_proto::key;
use kestrel_proto::types::{
    self as wire, GetRequest, MultiGetRequest, MultiPutRequest, MultiRemoveRequest, PutRequest,
    RemoveRequest, RequestBody, ResponseBody, SortkeyCountRequest, TtlRequest,
};

use crate::batch;
use crate::executor::{OpRunner, RouteSpec};
use crate::meta::MetaResolver;
use crate::metrics::PerfCounters;
use crate::pool::SessionPool;
use crate::scan::{ScanOptions, Scanner};
use crate::table::TableHandle;

/// Default `max_kv_count` for multi-get when the caller does not bound it.
pub const MULTI_GET_DEFAULT_COUNT: i32 = 100;
/// Default `max_kv_size` for multi-get when the caller does not bound it.
pub const MULTI_GET_DEFAULT_SIZE: i32 = 1_000_000;

pub(crate) fn app_error(code: i32) -> KestrelError {
    KestrelError::Application {
        code,
        message: wire::error_name(code).to_string(),
    }
}

pub(crate) fn unexpected_reply(what: &str) -> KestrelError {
    KestrelError::Proto(format!("unexpected reply to {what}"))
}

/// One item of a fail-fast or tolerant batch set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetItem {
    pub hash_key: Vec<u8>,
    pub sort_key: Vec<u8>,
    pub value: Vec<u8>,
    /// 0 means no expiry.
    pub ttl_seconds: u32,
}

/// All (sortKey, value) pairs of one hashKey, for multi-key batch variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashKeyData {
    pub hash_key: Vec<u8>,
    pub kvs: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Result of a multi-get: the fetched pairs plus whether the server hit its
/// fetch limits before exhausting the match set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGetResult {
    /// (sortKey, value) pairs in sortKey order.
    pub kvs: Vec<(Vec<u8>, Vec<u8>)>,
    pub all_fetched: bool,
}

struct ClientInner {
    config: ClientConfig,
    pool: Arc<SessionPool>,
    resolver: Arc<MetaResolver>,
    runner: Arc<OpRunner>,
    tables: DashMap<String, Arc<TableHandle>>,
    closed: Arc<AtomicBool>,
}

/// Entry point: a handle to one Kestrel cluster.
#[derive(Clone)]
pub struct KestrelClient {
    inner: Arc<ClientInner>,
}

impl KestrelClient {
    /// Build a client from a validated configuration.
    pub fn new(config: ClientConfig) -> KestrelResult<Self> {
        config.validate()?;
        tracing::info!(
            meta_servers = %config.meta_servers.join(","),
            operation_timeout_ms = config.operation_timeout_ms,
            "kestrel client configured"
        );
        let pool = Arc::new(SessionPool::new());
        let resolver = Arc::new(MetaResolver::new(
            config.meta_servers.clone(),
            pool.clone(),
            config.operation_timeout(),
        ));
        let runner = Arc::new(OpRunner::new(
            pool.clone(),
            config.operation_timeout(),
            PerfCounters::new(config.enable_perf_counter, config.perf_counter_tags.clone()),
        ));
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                pool,
                resolver,
                runner,
                tables: DashMap::new(),
                closed: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    /// Build a client from the external loader's property map.
    pub fn from_properties(props: &HashMap<String, String>) -> KestrelResult<Self> {
        Self::new(ClientConfig::from_properties(props)?)
    }

    /// One `key=value` line per recognized configuration key.
    pub fn config_summary(&self) -> String {
        self.inner.config.summary()
    }

    fn ensure_open(&self) -> KestrelResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(KestrelError::Cancelled);
        }
        Ok(())
    }

    fn make_table(&self, handle: Arc<TableHandle>) -> Table {
        Table {
            handle,
            runner: self.inner.runner.clone(),
            closed: self.inner.closed.clone(),
            deadline: Duration::ZERO,
        }
    }

    /// Open (or return the interned) handle for a table.
    pub async fn open_table(&self, table_name: &str) -> KestrelResult<Table> {
        self.ensure_open()?;
        if let Some(handle) = self.inner.tables.get(table_name) {
            return Ok(self.make_table(handle.clone()));
        }
        let handle =
            TableHandle::open(table_name.to_string(), self.inner.resolver.clone()).await?;
        // First insert wins when openers race; later resolvers drop theirs.
        let handle = self
            .inner
            .tables
            .entry(table_name.to_string())
            .or_insert(handle)
            .clone();
        Ok(self.make_table(handle))
    }

    /// Drain sessions and refuse further calls. In-flight operations
    /// complete with `Cancelled`.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("kestrel client closing");
        self.inner.pool.close_all();
        self.inner.tables.clear();
    }

    // ── Named operations (thin adapters over Table) ──────────────────────

    pub async fn exist(&self, table: &str, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<bool> {
        self.open_table(table).await?.exist(hash_key, sort_key).await
    }

    pub async fn get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
    ) -> KestrelResult<Option<Vec<u8>>> {
        self.open_table(table).await?.get(hash_key, sort_key).await
    }

    pub async fn set(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
    ) -> KestrelResult<()> {
        self.open_table(table).await?.set(hash_key, sort_key, value).await
    }

    pub async fn set_with_ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        self.open_table(table)
            .await?
            .set_with_ttl(hash_key, sort_key, value, ttl_seconds)
            .await
    }

    pub async fn del(&self, table: &str, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<()> {
        self.open_table(table).await?.del(hash_key, sort_key).await
    }

    pub async fn ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
    ) -> KestrelResult<Option<i32>> {
        self.open_table(table).await?.ttl(hash_key, sort_key).await
    }

    pub async fn sortkey_count(&self, table: &str, hash_key: &[u8]) -> KestrelResult<i64> {
        self.open_table(table).await?.sortkey_count(hash_key).await
    }

    pub async fn multi_get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<MultiGetResult> {
        self.open_table(table).await?.multi_get(hash_key, sort_keys).await
    }

    pub async fn multi_get_sort_keys(
        &self,
        table: &str,
        hash_key: &[u8],
    ) -> KestrelResult<(Vec<Vec<u8>>, bool)> {
        self.open_table(table).await?.multi_get_sort_keys(hash_key).await
    }

    pub async fn multi_set(
        &self,
        table: &str,
        hash_key: &[u8],
        kvs: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<()> {
        self.open_table(table).await?.multi_set(hash_key, kvs).await
    }

    pub async fn multi_del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<i64> {
        self.open_table(table).await?.multi_del(hash_key, sort_keys).await
    }

    pub async fn batch_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<Vec<Option<Vec<u8>>>> {
        self.open_table(table).await?.batch_get(keys).await
    }

    pub async fn try_batch_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<(Vec<KestrelResult<Option<Vec<u8>>>>, usize)> {
        Ok(self.open_table(table).await?.try_batch_get(keys).await)
    }

    pub async fn batch_set(&self, table: &str, items: &[SetItem]) -> KestrelResult<()> {
        self.open_table(table).await?.batch_set(items).await
    }

    pub async fn try_batch_set(
        &self,
        table: &str,
        items: &[SetItem],
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        Ok(self.open_table(table).await?.try_batch_set(items).await)
    }

    pub async fn batch_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<()> {
        self.open_table(table).await?.batch_del(keys).await
    }

    pub async fn try_batch_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        Ok(self.open_table(table).await?.try_batch_del(keys).await)
    }

    pub async fn batch_multi_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<Vec<HashKeyData>> {
        self.open_table(table).await?.batch_multi_get(keys).await
    }

    pub async fn try_batch_multi_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<(Vec<KestrelResult<HashKeyData>>, usize)> {
        Ok(self.open_table(table).await?.try_batch_multi_get(keys).await)
    }

    pub async fn batch_multi_set(
        &self,
        table: &str,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        self.open_table(table).await?.batch_multi_set(items, ttl_seconds).await
    }

    pub async fn try_batch_multi_set(
        &self,
        table: &str,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        Ok(self
            .open_table(table)
            .await?
            .try_batch_multi_set(items, ttl_seconds)
            .await)
    }

    pub async fn batch_multi_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<()> {
        self.open_table(table).await?.batch_multi_del(keys).await
    }

    pub async fn try_batch_multi_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<(Vec<KestrelResult<i64>>, usize)> {
        Ok(self.open_table(table).await?.try_batch_multi_del(keys).await)
    }

    pub async fn get_scanner(
        &self,
        table: &str,
        hash_key: &[u8],
        start_sort_key: &[u8],
        stop_sort_key: &[u8],
        options: ScanOptions,
    ) -> KestrelResult<Scanner> {
        self.open_table(table)
            .await?
            .get_scanner(hash_key, start_sort_key, stop_sort_key, options)
    }

    pub async fn get_unordered_scanners(
        &self,
        table: &str,
        max_split_count: usize,
        options: ScanOptions,
    ) -> KestrelResult<Vec<Scanner>> {
        self.open_table(table)
            .await?
            .get_unordered_scanners(max_split_count, options)
    }
}

/// Operation surface of one table.
#[derive(Clone)]
pub struct Table {
    handle: Arc<TableHandle>,
    runner: Arc<OpRunner>,
    closed: Arc<AtomicBool>,
    /// Per-call deadline; zero means the client default.
    deadline: Duration,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}

impl Table {
    pub fn name(&self) -> String {
        self.handle.name().to_string()
    }

    pub fn table_id(&self) -> TableId {
        self.handle.table_id()
    }

    pub fn partition_count(&self) -> u32 {
        self.handle.partition_count()
    }

    /// A clone of this handle whose operations carry an explicit deadline.
    pub fn with_deadline(&self, deadline: Duration) -> Table {
        let mut table = self.clone();
        table.deadline = deadline;
        table
    }

    fn ensure_open(&self) -> KestrelResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KestrelError::Cancelled);
        }
        Ok(())
    }

    async fn execute<F>(&self, route: RouteSpec, build: F) -> KestrelResult<ResponseBody>
    where
        F: Fn(kestrel_common::types::Gpid) -> RequestBody,
    {
        self.ensure_open()?;
        self.runner
            .execute(&self.handle, route, self.deadline, build)
            .await
    }

    // ── Point operations ─────────────────────────────────────────────────

    /// Read one record; `None` when it does not exist.
    pub async fn get(&self, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<Option<Vec<u8>>> {
        let encoded = key::encode_key(hash_key, sort_key)?;
        let hash = key::key_hash(hash_key, sort_key);
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::Get(GetRequest {
                    gpid,
                    key: encoded.clone(),
                })
            })
            .await?;
        let ResponseBody::Get(r) = resp else {
            return Err(unexpected_reply("get"));
        };
        match r.error {
            wire::ERR_OK => Ok(Some(r.value)),
            wire::ERR_KEY_NOT_FOUND => Ok(None),
            code => Err(app_error(code)),
        }
    }

    /// Write one record without expiry.
    pub async fn set(&self, hash_key: &[u8], sort_key: &[u8], value: &[u8]) -> KestrelResult<()> {
        self.set_with_ttl(hash_key, sort_key, value, 0).await
    }

    /// Write one record that expires `ttl_seconds` from now (0 = never).
    pub async fn set_with_ttl(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        let encoded = key::encode_key(hash_key, sort_key)?;
        let hash = key::key_hash(hash_key, sort_key);
        let value = value.to_vec();
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::Put(PutRequest {
                    gpid,
                    key: encoded.clone(),
                    value: value.clone(),
                    ttl_seconds,
                })
            })
            .await?;
        let ResponseBody::Put(r) = resp else {
            return Err(unexpected_reply("set"));
        };
        match r.error {
            wire::ERR_OK => Ok(()),
            code => Err(app_error(code)),
        }
    }

    /// Delete one record. Deleting an absent record is not an error.
    pub async fn del(&self, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<()> {
        let encoded = key::encode_key(hash_key, sort_key)?;
        let hash = key::key_hash(hash_key, sort_key);
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::Remove(RemoveRequest {
                    gpid,
                    key: encoded.clone(),
                })
            })
            .await?;
        let ResponseBody::Remove(r) = resp else {
            return Err(unexpected_reply("del"));
        };
        match r.error {
            wire::ERR_OK | wire::ERR_KEY_NOT_FOUND => Ok(()),
            code => Err(app_error(code)),
        }
    }

    /// Remaining time-to-live. `None` when the record does not exist,
    /// `Some(-1)` when it exists without an expiry.
    pub async fn ttl(&self, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<Option<i32>> {
        let encoded = key::encode_key(hash_key, sort_key)?;
        let hash = key::key_hash(hash_key, sort_key);
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::Ttl(TtlRequest {
                    gpid,
                    key: encoded.clone(),
                })
            })
            .await?;
        let ResponseBody::Ttl(r) = resp else {
            return Err(unexpected_reply("ttl"));
        };
        match r.error {
            wire::ERR_OK => Ok(Some(r.ttl_seconds)),
            wire::ERR_KEY_NOT_FOUND => Ok(None),
            code => Err(app_error(code)),
        }
    }

    /// Whether a record exists.
    pub async fn exist(&self, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<bool> {
        Ok(self.ttl(hash_key, sort_key).await?.is_some())
    }

    /// Number of sortKeys under one hashKey.
    pub async fn sortkey_count(&self, hash_key: &[u8]) -> KestrelResult<i64> {
        key::encode_key(hash_key, &[])?;
        let hash = key::key_hash(hash_key, &[]);
        let hash_key = hash_key.to_vec();
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::SortkeyCount(SortkeyCountRequest {
                    gpid,
                    hash_key: hash_key.clone(),
                })
            })
            .await?;
        let ResponseBody::SortkeyCount(r) = resp else {
            return Err(unexpected_reply("sortkey_count"));
        };
        match r.error {
            wire::ERR_OK => Ok(r.count),
            code => Err(app_error(code)),
        }
    }

    // ── Multi-key operations (single hashKey, atomic) ────────────────────

    /// Read several sortKeys of one hashKey; an empty `sort_keys` slice
    /// reads every record under the hashKey, bounded by the defaults.
    pub async fn multi_get(
        &self,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<MultiGetResult> {
        self.multi_get_with_limits(
            hash_key,
            sort_keys,
            MULTI_GET_DEFAULT_COUNT,
            MULTI_GET_DEFAULT_SIZE,
        )
        .await
    }

    /// Multi-get with explicit fetch bounds (`-1` means unbounded).
    pub async fn multi_get_with_limits(
        &self,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
        max_kv_count: i32,
        max_kv_size: i32,
    ) -> KestrelResult<MultiGetResult> {
        let resp = self
            .multi_get_raw(hash_key, sort_keys, max_kv_count, max_kv_size, false)
            .await?;
        Ok(MultiGetResult {
            all_fetched: resp.error != wire::ERR_INCOMPLETE,
            kvs: resp.kvs.into_iter().map(|kv| (kv.key, kv.value)).collect(),
        })
    }

    /// Only the sortKeys of one hashKey (values projected away server-side).
    pub async fn multi_get_sort_keys(
        &self,
        hash_key: &[u8],
    ) -> KestrelResult<(Vec<Vec<u8>>, bool)> {
        let resp = self
            .multi_get_raw(
                hash_key,
                &[],
                MULTI_GET_DEFAULT_COUNT,
                MULTI_GET_DEFAULT_SIZE,
                true,
            )
            .await?;
        let all_fetched = resp.error != wire::ERR_INCOMPLETE;
        Ok((resp.kvs.into_iter().map(|kv| kv.key).collect(), all_fetched))
    }

    async fn multi_get_raw(
        &self,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
        max_kv_count: i32,
        max_kv_size: i32,
        no_value: bool,
    ) -> KestrelResult<wire::MultiGetResponse> {
        // Validate the hashKey length up front, like every keyed op.
        key::encode_key(hash_key, &[])?;
        let hash = key::key_hash(hash_key, &[]);
        let hash_key = hash_key.to_vec();
        let sort_keys = sort_keys.to_vec();
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::MultiGet(MultiGetRequest {
                    gpid,
                    hash_key: hash_key.clone(),
                    sort_keys: sort_keys.clone(),
                    max_kv_count,
                    max_kv_size,
                    no_value,
                })
            })
            .await?;
        let ResponseBody::MultiGet(r) = resp else {
            return Err(unexpected_reply("multi_get"));
        };
        match r.error {
            wire::ERR_OK | wire::ERR_INCOMPLETE => Ok(r),
            wire::ERR_KEY_NOT_FOUND => Ok(wire::MultiGetResponse {
                error: wire::ERR_OK,
                kvs: Vec::new(),
            }),
            code => Err(app_error(code)),
        }
    }

    /// Write several (sortKey, value) pairs of one hashKey atomically.
    pub async fn multi_set(
        &self,
        hash_key: &[u8],
        kvs: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<()> {
        self.multi_set_with_ttl(hash_key, kvs, 0).await
    }

    /// Multi-set with a shared expiry (0 = never).
    pub async fn multi_set_with_ttl(
        &self,
        hash_key: &[u8],
        kvs: &[(Vec<u8>, Vec<u8>)],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        if kvs.is_empty() {
            return Err(KestrelError::invalid_argument(
                "multi_set requires at least one (sortKey, value) pair",
            ));
        }
        key::encode_key(hash_key, &[])?;
        let hash = key::key_hash(hash_key, &[]);
        let hash_key = hash_key.to_vec();
        let kvs: Vec<wire::KeyValue> = kvs
            .iter()
            .map(|(k, v)| wire::KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::MultiPut(MultiPutRequest {
                    gpid,
                    hash_key: hash_key.clone(),
                    kvs: kvs.clone(),
                    ttl_seconds,
                })
            })
            .await?;
        let ResponseBody::MultiPut(r) = resp else {
            return Err(unexpected_reply("multi_set"));
        };
        match r.error {
            wire::ERR_OK => Ok(()),
            code => Err(app_error(code)),
        }
    }

    /// Delete several sortKeys of one hashKey atomically; an empty
    /// `sort_keys` slice deletes every record under the hashKey. Returns
    /// the number of records removed.
    pub async fn multi_del(
        &self,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<i64> {
        key::encode_key(hash_key, &[])?;
        let hash = key::key_hash(hash_key, &[]);
        let hash_key = hash_key.to_vec();
        let sort_keys = sort_keys.to_vec();
        let resp = self
            .execute(RouteSpec::Hash(hash), move |gpid| {
                RequestBody::MultiRemove(MultiRemoveRequest {
                    gpid,
                    hash_key: hash_key.clone(),
                    sort_keys: sort_keys.clone(),
                })
            })
            .await?;
        let ResponseBody::MultiRemove(r) = resp else {
            return Err(unexpected_reply("multi_del"));
        };
        match r.error {
            wire::ERR_OK => Ok(r.count),
            code => Err(app_error(code)),
        }
    }

    // ── Batch operations (independent items, concurrent fan-out) ─────────

    /// Fail-fast batch read; results are parallel to `keys`.
    pub async fn batch_get(
        &self,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<Vec<Option<Vec<u8>>>> {
        batch::first_error(self.spawn_batch_get(keys).await)
    }

    /// Tolerant batch read: positional per-item results plus failure count.
    pub async fn try_batch_get(
        &self,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> (Vec<KestrelResult<Option<Vec<u8>>>>, usize) {
        let results = self.spawn_batch_get(keys).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_get(
        &self,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> Vec<KestrelResult<Option<Vec<u8>>>> {
        let futures: Vec<_> = keys
            .iter()
            .cloned()
            .map(|(hash_key, sort_key)| {
                let table = self.clone();
                async move { table.get(&hash_key, &sort_key).await }
            })
            .collect();
        batch::run_all(futures).await
    }

    /// Fail-fast batch write.
    pub async fn batch_set(&self, items: &[SetItem]) -> KestrelResult<()> {
        batch::first_error(self.spawn_batch_set(items).await).map(|_| ())
    }

    /// Tolerant batch write.
    pub async fn try_batch_set(&self, items: &[SetItem]) -> (Vec<KestrelResult<()>>, usize) {
        let results = self.spawn_batch_set(items).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_set(&self, items: &[SetItem]) -> Vec<KestrelResult<()>> {
        let futures: Vec<_> = items
            .iter()
            .cloned()
            .map(|item| {
                let table = self.clone();
                async move {
                    table
                        .set_with_ttl(&item.hash_key, &item.sort_key, &item.value, item.ttl_seconds)
                        .await
                }
            })
            .collect();
        batch::run_all(futures).await
    }

    /// Fail-fast batch delete.
    pub async fn batch_del(&self, keys: &[(Vec<u8>, Vec<u8>)]) -> KestrelResult<()> {
        batch::first_error(self.spawn_batch_del(keys).await).map(|_| ())
    }

    /// Tolerant batch delete.
    pub async fn try_batch_del(
        &self,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> (Vec<KestrelResult<()>>, usize) {
        let results = self.spawn_batch_del(keys).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_del(&self, keys: &[(Vec<u8>, Vec<u8>)]) -> Vec<KestrelResult<()>> {
        let futures: Vec<_> = keys
            .iter()
            .cloned()
            .map(|(hash_key, sort_key)| {
                let table = self.clone();
                async move { table.del(&hash_key, &sort_key).await }
            })
            .collect();
        batch::run_all(futures).await
    }

    /// Fail-fast batch of multi-gets, one per hashKey.
    pub async fn batch_multi_get(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<Vec<HashKeyData>> {
        batch::first_error(self.spawn_batch_multi_get(keys).await)
    }

    /// Tolerant batch of multi-gets.
    pub async fn try_batch_multi_get(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> (Vec<KestrelResult<HashKeyData>>, usize) {
        let results = self.spawn_batch_multi_get(keys).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_multi_get(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> Vec<KestrelResult<HashKeyData>> {
        let futures: Vec<_> = keys
            .iter()
            .cloned()
            .map(|(hash_key, sort_keys)| {
                let table = self.clone();
                async move {
                    let result = table.multi_get(&hash_key, &sort_keys).await?;
                    Ok(HashKeyData {
                        hash_key,
                        kvs: result.kvs,
                    })
                }
            })
            .collect();
        batch::run_all(futures).await
    }

    /// Fail-fast batch of multi-sets, one per hashKey, sharing a ttl.
    pub async fn batch_multi_set(
        &self,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        batch::first_error(self.spawn_batch_multi_set(items, ttl_seconds).await).map(|_| ())
    }

    /// Tolerant batch of multi-sets.
    pub async fn try_batch_multi_set(
        &self,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> (Vec<KestrelResult<()>>, usize) {
        let results = self.spawn_batch_multi_set(items, ttl_seconds).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_multi_set(
        &self,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> Vec<KestrelResult<()>> {
        let futures: Vec<_> = items
            .iter()
            .cloned()
            .map(|item| {
                let table = self.clone();
                async move {
                    table
                        .multi_set_with_ttl(&item.hash_key, &item.kvs, ttl_seconds)
                        .await
                }
            })
            .collect();
        batch::run_all(futures).await
    }

    /// Fail-fast batch of multi-deletes, one per hashKey.
    pub async fn batch_multi_del(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<()> {
        batch::first_error(self.spawn_batch_multi_del(keys).await).map(|_| ())
    }

    /// Tolerant batch of multi-deletes; per-item results carry the removal
    /// counts.
    pub async fn try_batch_multi_del(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> (Vec<KestrelResult<i64>>, usize) {
        let results = self.spawn_batch_multi_del(keys).await;
        let failures = batch::count_failures(&results);
        (results, failures)
    }

    async fn spawn_batch_multi_del(
        &self,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> Vec<KestrelResult<i64>> {
        let futures: Vec<_> = keys
            .iter()
            .cloned()
            .map(|(hash_key, sort_keys)| {
                let table = self.clone();
                async move { table.multi_del(&hash_key, &sort_keys).await }
            })
            .collect();
        batch::run_all(futures).await
    }

    // ── Scans ────────────────────────────────────────────────────────────

    /// Bounded cursor over one hashKey's sortKey range. An empty
    /// `stop_sort_key` scans to the end of the hashKey.
    pub fn get_scanner(
        &self,
        hash_key: &[u8],
        start_sort_key: &[u8],
        stop_sort_key: &[u8],
        options: ScanOptions,
    ) -> KestrelResult<Scanner> {
        self.ensure_open()?;
        Scanner::bounded(
            self.runner.clone(),
            self.handle.clone(),
            hash_key,
            start_sort_key,
            stop_sort_key,
            options,
        )
    }

    /// At most `max_split_count` independent cursors jointly covering the
    /// whole table, in no particular order.
    pub fn get_unordered_scanners(
        &self,
        max_split_count: usize,
        options: ScanOptions,
    ) -> KestrelResult<Vec<Scanner>> {
        self.ensure_open()?;
        Ok(Scanner::unordered(
            self.runner.clone(),
            self.handle.clone(),
            max_split_count,
            options,
        ))
    }
}
