//! In-process mock cluster: one table, N replica nodes, M meta servers,
//! all speaking the real wire protocol over loopback TCP.
//!
//! Supports the fault hooks the integration tests need: one-shot injected
//! replica exceptions, primary moves (with version bumps), dropped
//! primaries, and meta-leader changes.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use kestrel_client::ClientConfig;
use kestrel_common::types::Gpid;
use kestrel_proto::codec::{self, Frame};
use kestrel_proto::key;
use kestrel_proto::types::*;

pub const TABLE_NAME: &str = "mocktable";
pub const TABLE_ID: i32 = 12;

/// Install a test-writer subscriber once; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A primary-less partition.
const NO_NODE: usize = usize::MAX;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct Record {
    value: Vec<u8>,
    expire_at: Option<u64>,
    modified_ts: u64,
}

impl Record {
    fn live(&self, now: u64) -> bool {
        self.expire_at.map(|at| at > now).unwrap_or(true)
    }
}

struct ScanCtx {
    partition: u32,
    remaining: VecDeque<KeyValue>,
    batch_size: usize,
}

pub struct ClusterState {
    partition_count: u32,
    version: AtomicU64,
    meta_leader: AtomicUsize,
    meta_addrs: Mutex<Vec<String>>,
    node_addrs: Mutex<Vec<String>>,
    routing: Mutex<Vec<usize>>,
    data: Vec<Mutex<BTreeMap<Vec<u8>, Record>>>,
    scan_ctxs: Mutex<HashMap<i64, ScanCtx>>,
    next_ctx: AtomicI64,
    query_config_calls: AtomicU64,
    injected: Mutex<VecDeque<(u32, i32)>>,
}

pub struct MockCluster {
    pub meta_addrs: Vec<String>,
    state: Arc<ClusterState>,
}

impl MockCluster {
    pub async fn start(partition_count: u32, node_count: usize) -> Self {
        Self::start_with_metas(1, partition_count, node_count).await
    }

    pub async fn start_with_metas(
        meta_count: usize,
        partition_count: u32,
        node_count: usize,
    ) -> Self {
        assert!(partition_count.is_power_of_two());
        let state = Arc::new(ClusterState {
            partition_count,
            version: AtomicU64::new(1),
            meta_leader: AtomicUsize::new(0),
            meta_addrs: Mutex::new(Vec::new()),
            node_addrs: Mutex::new(Vec::new()),
            routing: Mutex::new(
                (0..partition_count as usize).map(|i| i % node_count).collect(),
            ),
            data: (0..partition_count).map(|_| Mutex::new(BTreeMap::new())).collect(),
            scan_ctxs: Mutex::new(HashMap::new()),
            next_ctx: AtomicI64::new(1),
            query_config_calls: AtomicU64::new(0),
            injected: Mutex::new(VecDeque::new()),
        });

        let mut meta_addrs = Vec::new();
        for index in 0..meta_count {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            meta_addrs.push(listener.local_addr().unwrap().to_string());
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let state = state.clone();
                    tokio::spawn(async move {
                        serve_conn(stream, state, move |state, frame| {
                            handle_meta(state, index, frame)
                        })
                        .await;
                    });
                }
            });
        }
        *state.meta_addrs.lock() = meta_addrs.clone();

        let mut node_addrs = Vec::new();
        for index in 0..node_count {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            node_addrs.push(listener.local_addr().unwrap().to_string());
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let state = state.clone();
                    tokio::spawn(async move {
                        serve_conn(stream, state, move |state, frame| {
                            handle_node(state, index, frame)
                        })
                        .await;
                    });
                }
            });
        }
        *state.node_addrs.lock() = node_addrs;

        Self { meta_addrs, state }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.meta_addrs.clone())
    }

    /// Total `query_config` calls answered by any meta server.
    pub fn query_config_calls(&self) -> u64 {
        self.state.query_config_calls.load(Ordering::SeqCst)
    }

    /// Make the next storage request against `partition` fail once with the
    /// given replica exception code.
    pub fn inject_replica_error(&self, partition: u32, code: i32) {
        self.state.injected.lock().push_back((partition, code));
    }

    /// Reassign a partition's primary and bump the map version. Server-side
    /// scan contexts of the partition die with the old primary.
    pub fn move_partition(&self, partition: u32, node_index: usize) {
        self.state.routing.lock()[partition as usize] = node_index;
        self.state
            .scan_ctxs
            .lock()
            .retain(|_, ctx| ctx.partition != partition);
        self.state.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Leave a partition without a primary.
    pub fn drop_primary(&self, partition: u32) {
        self.state.routing.lock()[partition as usize] = NO_NODE;
        self.state.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Change which meta server answers as leader; the others redirect.
    pub fn set_meta_leader(&self, index: usize) {
        self.state.meta_leader.store(index, Ordering::SeqCst);
    }

    /// The partition a (hashKey, sortKey) routes to.
    pub fn partition_of(&self, hash_key: &[u8], sort_key: &[u8]) -> u32 {
        key::partition_index(key::key_hash(hash_key, sort_key), self.state.partition_count)
    }
}

async fn serve_conn<F>(mut stream: TcpStream, state: Arc<ClusterState>, handle: F)
where
    F: Fn(&ClusterState, &Frame) -> BytesMut,
{
    let mut buf = BytesMut::with_capacity(16 * 1024);
    loop {
        loop {
            match codec::decode_frame(&buf) {
                Ok((frame, consumed)) => {
                    let _ = buf.split_to(consumed);
                    let reply = handle(&state, &frame);
                    if stream.write_all(&reply).await.is_err() {
                        return;
                    }
                }
                Err(e) if e.is_truncated() => break,
                Err(_) => return,
            }
        }
        match stream.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

fn handle_meta(state: &ClusterState, my_index: usize, frame: &Frame) -> BytesMut {
    let request = match codec::decode_request(&frame.method, &frame.payload) {
        Ok(request) => request,
        Err(_) => {
            return codec::encode_exception(
                &frame.method,
                frame.seqid,
                ERR_UNKNOWN_METHOD,
                "undecodable request",
            )
        }
    };
    let RequestBody::QueryConfig(query) = request else {
        return codec::encode_exception(
            &frame.method,
            frame.seqid,
            ERR_UNKNOWN_METHOD,
            "meta server only answers query_config",
        );
    };
    state.query_config_calls.fetch_add(1, Ordering::SeqCst);

    let leader = state.meta_leader.load(Ordering::SeqCst);
    let response = if leader != my_index {
        QueryConfigResponse {
            status: META_NOT_PRIMARY,
            hinted_primary: state.meta_addrs.lock().get(leader).cloned().unwrap_or_default(),
            table_id: 0,
            partition_count: state.partition_count,
            version: 0,
            partitions: Vec::new(),
        }
    } else if query.table_name != TABLE_NAME {
        QueryConfigResponse {
            status: META_TABLE_NOT_FOUND,
            hinted_primary: String::new(),
            table_id: 0,
            partition_count: state.partition_count,
            version: 0,
            partitions: Vec::new(),
        }
    } else {
        let routing = state.routing.lock();
        let node_addrs = state.node_addrs.lock();
        QueryConfigResponse {
            status: META_OK,
            hinted_primary: String::new(),
            table_id: TABLE_ID,
            partition_count: state.partition_count,
            version: state.version.load(Ordering::SeqCst),
            partitions: routing
                .iter()
                .enumerate()
                .map(|(index, node)| PartitionConfig {
                    partition_index: index as u32,
                    ballot: 1,
                    primary: node_addrs.get(*node).cloned().unwrap_or_default(),
                })
                .collect(),
        }
    };
    codec::encode_reply(
        &frame.method,
        frame.seqid,
        &ResponseBody::QueryConfig(response),
    )
}

fn request_gpid(request: &RequestBody) -> Option<Gpid> {
    match request {
        RequestBody::Get(r) => Some(r.gpid),
        RequestBody::Put(r) => Some(r.gpid),
        RequestBody::Remove(r) => Some(r.gpid),
        RequestBody::MultiGet(r) => Some(r.gpid),
        RequestBody::MultiPut(r) => Some(r.gpid),
        RequestBody::MultiRemove(r) => Some(r.gpid),
        RequestBody::Ttl(r) => Some(r.gpid),
        RequestBody::SortkeyCount(r) => Some(r.gpid),
        RequestBody::Scan(r) => Some(r.gpid),
        RequestBody::ScanContinue(r) => Some(r.gpid),
        RequestBody::ScanCancel(r) => Some(r.gpid),
        RequestBody::QueryConfig(_) => None,
    }
}

fn handle_node(state: &ClusterState, my_index: usize, frame: &Frame) -> BytesMut {
    let request = match codec::decode_request(&frame.method, &frame.payload) {
        Ok(request) => request,
        Err(_) => {
            return codec::encode_exception(
                &frame.method,
                frame.seqid,
                ERR_UNKNOWN_METHOD,
                "undecodable request",
            )
        }
    };
    let Some(gpid) = request_gpid(&request) else {
        return codec::encode_exception(
            &frame.method,
            frame.seqid,
            ERR_UNKNOWN_METHOD,
            "replica does not answer meta calls",
        );
    };
    let partition = gpid.partition_index;

    if let Some(code) = take_injected(state, partition) {
        return codec::encode_exception(&frame.method, frame.seqid, code, "injected fault");
    }
    if gpid.table_id.0 != TABLE_ID || partition >= state.partition_count {
        return codec::encode_exception(
            &frame.method,
            frame.seqid,
            ERR_OBJECT_NOT_FOUND,
            "no such replica",
        );
    }
    if state.routing.lock()[partition as usize] != my_index {
        return codec::encode_exception(
            &frame.method,
            frame.seqid,
            ERR_INVALID_STATE,
            "not primary for partition",
        );
    }

    let response = apply(state, partition, request);
    codec::encode_reply(&frame.method, frame.seqid, &response)
}

fn take_injected(state: &ClusterState, partition: u32) -> Option<i32> {
    let mut injected = state.injected.lock();
    let position = injected.iter().position(|(p, _)| *p == partition)?;
    injected.remove(position).map(|(_, code)| code)
}

/// Keys under one hashKey: `[encode(h, ""), upper_bound(h))`.
fn hash_key_range(
    map: &BTreeMap<Vec<u8>, Record>,
    hash_key: &[u8],
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let start = key::encode_key(hash_key, &[]).unwrap();
    let stop = key::hash_key_upper_bound(hash_key).unwrap();
    let upper = if stop.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Excluded(stop)
    };
    let now = now_secs();
    map.range((Bound::Included(start), upper))
        .filter(|(_, record)| record.live(now))
        .map(|(k, record)| (k.clone(), record.value.clone()))
        .collect()
}

fn apply(state: &ClusterState, partition: u32, request: RequestBody) -> ResponseBody {
    let now = now_secs();
    let mut map = state.data[partition as usize].lock();
    match request {
        RequestBody::Get(r) => match map.get(&r.key).filter(|record| record.live(now)) {
            Some(record) => ResponseBody::Get(GetResponse {
                error: ERR_OK,
                value: record.value.clone(),
            }),
            None => ResponseBody::Get(GetResponse {
                error: ERR_KEY_NOT_FOUND,
                value: Vec::new(),
            }),
        },
        RequestBody::Put(r) => {
            map.insert(
                r.key,
                Record {
                    value: r.value,
                    expire_at: (r.ttl_seconds > 0).then(|| now + u64::from(r.ttl_seconds)),
                    modified_ts: now,
                },
            );
            ResponseBody::Put(PutResponse { error: ERR_OK })
        }
        RequestBody::Remove(r) => {
            map.remove(&r.key);
            ResponseBody::Remove(RemoveResponse { error: ERR_OK })
        }
        RequestBody::Ttl(r) => match map.get(&r.key).filter(|record| record.live(now)) {
            Some(record) => ResponseBody::Ttl(TtlResponse {
                error: ERR_OK,
                ttl_seconds: record
                    .expire_at
                    .map(|at| (at - now) as i32)
                    .unwrap_or(-1),
            }),
            None => ResponseBody::Ttl(TtlResponse {
                error: ERR_KEY_NOT_FOUND,
                ttl_seconds: 0,
            }),
        },
        RequestBody::SortkeyCount(r) => ResponseBody::SortkeyCount(SortkeyCountResponse {
            error: ERR_OK,
            count: hash_key_range(&map, &r.hash_key).len() as i64,
        }),
        RequestBody::MultiGet(r) => {
            let mut kvs: Vec<KeyValue> = if r.sort_keys.is_empty() {
                hash_key_range(&map, &r.hash_key)
                    .into_iter()
                    .map(|(full_key, value)| {
                        let (_, sort_key) = key::decode_key(&full_key).unwrap();
                        KeyValue {
                            key: sort_key,
                            value,
                        }
                    })
                    .collect()
            } else {
                r.sort_keys
                    .iter()
                    .filter_map(|sort_key| {
                        let full_key = key::encode_key(&r.hash_key, sort_key).unwrap();
                        map.get(&full_key)
                            .filter(|record| record.live(now))
                            .map(|record| KeyValue {
                                key: sort_key.clone(),
                                value: record.value.clone(),
                            })
                    })
                    .collect()
            };
            let mut error = ERR_OK;
            if r.max_kv_count >= 0 && kvs.len() > r.max_kv_count as usize {
                kvs.truncate(r.max_kv_count as usize);
                error = ERR_INCOMPLETE;
            }
            if r.no_value {
                for kv in &mut kvs {
                    kv.value.clear();
                }
            }
            ResponseBody::MultiGet(MultiGetResponse { error, kvs })
        }
        RequestBody::MultiPut(r) => {
            for kv in r.kvs {
                let full_key = key::encode_key(&r.hash_key, &kv.key).unwrap();
                map.insert(
                    full_key,
                    Record {
                        value: kv.value,
                        expire_at: (r.ttl_seconds > 0).then(|| now + u64::from(r.ttl_seconds)),
                        modified_ts: now,
                    },
                );
            }
            ResponseBody::MultiPut(MultiPutResponse { error: ERR_OK })
        }
        RequestBody::MultiRemove(r) => {
            let targets: Vec<Vec<u8>> = if r.sort_keys.is_empty() {
                hash_key_range(&map, &r.hash_key)
                    .into_iter()
                    .map(|(full_key, _)| full_key)
                    .collect()
            } else {
                r.sort_keys
                    .iter()
                    .map(|sort_key| key::encode_key(&r.hash_key, sort_key).unwrap())
                    .collect()
            };
            let mut count = 0i64;
            for target in targets {
                if map.remove(&target).is_some() {
                    count += 1;
                }
            }
            ResponseBody::MultiRemove(MultiRemoveResponse {
                error: ERR_OK,
                count,
            })
        }
        RequestBody::Scan(r) => {
            let mut matched: VecDeque<KeyValue> = map
                .iter()
                .filter(|(k, record)| {
                    record.live(now)
                        && record.modified_ts >= r.min_modified_ts
                        && within(k, &r.start_key, r.start_inclusive, &r.stop_key, r.stop_inclusive)
                })
                .map(|(k, record)| KeyValue {
                    key: k.clone(),
                    value: if r.no_value {
                        Vec::new()
                    } else {
                        record.value.clone()
                    },
                })
                .collect();
            let batch_size = (r.batch_size.max(1)) as usize;
            let batch: Vec<KeyValue> = matched.drain(..batch_size.min(matched.len())).collect();
            let context_id = if matched.is_empty() {
                -1
            } else {
                let id = state.next_ctx.fetch_add(1, Ordering::SeqCst);
                state.scan_ctxs.lock().insert(
                    id,
                    ScanCtx {
                        partition,
                        remaining: matched,
                        batch_size,
                    },
                );
                id
            };
            ResponseBody::Scan(ScanResponse {
                error: ERR_OK,
                kvs: batch,
                context_id,
            })
        }
        RequestBody::ScanContinue(r) => {
            // Fetch removes the context; it is re-registered under a fresh
            // id only while data remains.
            let ctx = state.scan_ctxs.lock().remove(&r.context_id);
            match ctx {
                None => ResponseBody::Scan(ScanResponse {
                    error: ERR_SCAN_CONTEXT_GONE,
                    kvs: Vec::new(),
                    context_id: -1,
                }),
                Some(mut ctx) => {
                    let take = ctx.batch_size.min(ctx.remaining.len());
                    let batch: Vec<KeyValue> = ctx.remaining.drain(..take).collect();
                    let context_id = if ctx.remaining.is_empty() {
                        -1
                    } else {
                        let id = state.next_ctx.fetch_add(1, Ordering::SeqCst);
                        state.scan_ctxs.lock().insert(id, ctx);
                        id
                    };
                    ResponseBody::Scan(ScanResponse {
                        error: ERR_OK,
                        kvs: batch,
                        context_id,
                    })
                }
            }
        }
        RequestBody::ScanCancel(r) => {
            state.scan_ctxs.lock().remove(&r.context_id);
            ResponseBody::ScanCancel(ScanCancelResponse { error: ERR_OK })
        }
        RequestBody::QueryConfig(_) => unreachable!("filtered out by request_gpid"),
    }
}

fn within(k: &[u8], start: &[u8], start_inclusive: bool, stop: &[u8], stop_inclusive: bool) -> bool {
    match k.cmp(start) {
        std::cmp::Ordering::Less => return false,
        std::cmp::Ordering::Equal if !start_inclusive => return false,
        _ => {}
    }
    if !stop.is_empty() {
        match k.cmp(stop) {
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal if !stop_inclusive => return false,
            _ => {}
        }
    }
    true
}
