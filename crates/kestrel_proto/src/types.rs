//! Wire message types and constants.

use kestrel_common::types::Gpid;

use crate::error::ProtoError;

/// Maximum frame payload size: 64 MiB.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Bytes of the frame length prefix.
pub const FRAME_LEN_PREFIX: usize = 4;

// ── Message kinds ────────────────────────────────────────────────────────

pub const MSG_CALL: u8 = 1;
pub const MSG_REPLY: u8 = 2;
pub const MSG_EXCEPTION: u8 = 3;

/// Frame direction/role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Reply,
    Exception,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Call => MSG_CALL,
            MessageKind::Reply => MSG_REPLY,
            MessageKind::Exception => MSG_EXCEPTION,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self, ProtoError> {
        match v {
            MSG_CALL => Ok(MessageKind::Call),
            MSG_REPLY => Ok(MessageKind::Reply),
            MSG_EXCEPTION => Ok(MessageKind::Exception),
            other => Err(ProtoError::UnknownMessageKind(other)),
        }
    }
}

// ── Method names ─────────────────────────────────────────────────────────

pub const METHOD_GET: &str = "RPC_KV_GET";
pub const METHOD_PUT: &str = "RPC_KV_PUT";
pub const METHOD_REMOVE: &str = "RPC_KV_REMOVE";
pub const METHOD_MULTI_GET: &str = "RPC_KV_MULTI_GET";
pub const METHOD_MULTI_PUT: &str = "RPC_KV_MULTI_PUT";
pub const METHOD_MULTI_REMOVE: &str = "RPC_KV_MULTI_REMOVE";
pub const METHOD_TTL: &str = "RPC_KV_TTL";
pub const METHOD_SORTKEY_COUNT: &str = "RPC_KV_SORTKEY_COUNT";
pub const METHOD_SCAN: &str = "RPC_KV_SCAN";
pub const METHOD_SCAN_CONTINUE: &str = "RPC_KV_SCAN_CONTINUE";
pub const METHOD_SCAN_CANCEL: &str = "RPC_KV_SCAN_CANCEL";
pub const METHOD_QUERY_CONFIG: &str = "RPC_META_QUERY_CONFIG";

// ── Application error codes (carried in REPLY bodies) ────────────────────

pub const ERR_OK: i32 = 0;
pub const ERR_KEY_NOT_FOUND: i32 = 1;
/// More data matched than the response could carry; the caller sees a
/// partial result with `all_fetched == false`.
pub const ERR_INCOMPLETE: i32 = 2;
pub const ERR_TTL_INVALID: i32 = 3;
pub const ERR_VALUE_TOO_LARGE: i32 = 4;
pub const ERR_SCAN_CONTEXT_GONE: i32 = 5;
pub const ERR_WRITE_CONFLICT: i32 = 6;

// ── Replica exception codes (carried in EXCEPTION bodies) ────────────────

pub const ERR_UNKNOWN: i32 = 100;
pub const ERR_TIMEOUT: i32 = 101;
pub const ERR_BUSY: i32 = 102;
pub const ERR_INVALID_STATE: i32 = 103;
pub const ERR_OBJECT_NOT_FOUND: i32 = 104;
pub const ERR_PARENT_PARTITION_MISUSED: i32 = 105;
pub const ERR_NOT_ENOUGH_MEMBER: i32 = 106;
pub const ERR_UNKNOWN_METHOD: i32 = 107;

/// Exception codes that mean the contacted replica is not (or no longer)
/// the primary of the addressed partition. They invalidate the cached
/// partition map rather than the connection.
pub fn is_routing_error(code: i32) -> bool {
    matches!(
        code,
        ERR_INVALID_STATE | ERR_OBJECT_NOT_FOUND | ERR_PARENT_PARTITION_MISUSED
            | ERR_NOT_ENOUGH_MEMBER
    )
}

/// Exception codes worth a plain retry against the same replica.
pub fn is_transient_error(code: i32) -> bool {
    matches!(code, ERR_TIMEOUT | ERR_BUSY)
}

/// Human-readable name for any wire error code.
pub fn error_name(code: i32) -> &'static str {
    match code {
        ERR_OK => "ERR_OK",
        ERR_KEY_NOT_FOUND => "ERR_KEY_NOT_FOUND",
        ERR_INCOMPLETE => "ERR_INCOMPLETE",
        ERR_TTL_INVALID => "ERR_TTL_INVALID",
        ERR_VALUE_TOO_LARGE => "ERR_VALUE_TOO_LARGE",
        ERR_SCAN_CONTEXT_GONE => "ERR_SCAN_CONTEXT_GONE",
        ERR_WRITE_CONFLICT => "ERR_WRITE_CONFLICT",
        ERR_UNKNOWN => "ERR_UNKNOWN",
        ERR_TIMEOUT => "ERR_TIMEOUT",
        ERR_BUSY => "ERR_BUSY",
        ERR_INVALID_STATE => "ERR_INVALID_STATE",
        ERR_OBJECT_NOT_FOUND => "ERR_OBJECT_NOT_FOUND",
        ERR_PARENT_PARTITION_MISUSED => "ERR_PARENT_PARTITION_MISUSED",
        ERR_NOT_ENOUGH_MEMBER => "ERR_NOT_ENOUGH_MEMBER",
        ERR_UNKNOWN_METHOD => "ERR_UNKNOWN_METHOD",
        _ => "ERR_UNRECOGNIZED",
    }
}

// ── Meta status codes ────────────────────────────────────────────────────

pub const META_OK: i32 = 0;
pub const META_TABLE_NOT_FOUND: i32 = 1;
/// The contacted meta server is not the leader; `hinted_primary` may name it.
pub const META_NOT_PRIMARY: i32 = 2;
pub const META_BUSY: i32 = 3;

// ── Message bodies ───────────────────────────────────────────────────────

/// One (key, value) pair; the key is a sortKey in multi-ops and a full
/// encoded composite key in scan responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub gpid: Gpid,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub error: i32,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub gpid: Gpid,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// 0 means no expiry.
    pub ttl_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    pub gpid: Gpid,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResponse {
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlRequest {
    pub gpid: Gpid,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlResponse {
    pub error: i32,
    /// Remaining seconds; -1 when the record has no expiry.
    pub ttl_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortkeyCountRequest {
    pub gpid: Gpid,
    pub hash_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortkeyCountResponse {
    pub error: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGetRequest {
    pub gpid: Gpid,
    pub hash_key: Vec<u8>,
    /// Empty means "every sortKey under the hash key".
    pub sort_keys: Vec<Vec<u8>>,
    pub max_kv_count: i32,
    pub max_kv_size: i32,
    /// Sort-key-only projection: values come back empty.
    pub no_value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGetResponse {
    /// `ERR_OK`, `ERR_KEY_NOT_FOUND` or `ERR_INCOMPLETE`.
    pub error: i32,
    /// Keys are sortKeys.
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPutRequest {
    pub gpid: Gpid,
    pub hash_key: Vec<u8>,
    /// Keys are sortKeys.
    pub kvs: Vec<KeyValue>,
    pub ttl_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPutResponse {
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRemoveRequest {
    pub gpid: Gpid,
    pub hash_key: Vec<u8>,
    /// Empty means "every sortKey under the hash key".
    pub sort_keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRemoveResponse {
    pub error: i32,
    /// Number of records removed.
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub gpid: Gpid,
    pub start_key: Vec<u8>,
    /// Empty means "+∞" (scan to the end of the partition).
    pub stop_key: Vec<u8>,
    pub start_inclusive: bool,
    pub stop_inclusive: bool,
    pub batch_size: u32,
    /// Sort-key-only projection: values come back empty.
    pub no_value: bool,
    /// Skip records last modified before this epoch-second (0 = no filter).
    pub min_modified_ts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContinueRequest {
    pub gpid: Gpid,
    pub context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCancelRequest {
    pub gpid: Gpid,
    pub context_id: i64,
}

/// Shared by `scan` and `scan_continue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResponse {
    pub error: i32,
    /// Keys are full encoded composite keys.
    pub kvs: Vec<KeyValue>,
    /// Server cursor to resume from; -1 means the server kept no context.
    pub context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCancelResponse {
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfigRequest {
    pub table_name: String,
}

/// One partition's routing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    pub partition_index: u32,
    pub ballot: i64,
    /// `host:port` of the current primary; empty when the partition has none.
    pub primary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfigResponse {
    /// One of the `META_*` status codes.
    pub status: i32,
    /// Populated on `META_NOT_PRIMARY` when the leader is known.
    pub hinted_primary: String,
    pub table_id: i32,
    pub partition_count: u32,
    pub version: u64,
    pub partitions: Vec<PartitionConfig>,
}

/// Remote exception body (replica- or transport-level failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteException {
    pub code: i32,
    pub message: String,
}

// ── Body enums ───────────────────────────────────────────────────────────

/// Typed argument structure of every CALL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Get(GetRequest),
    Put(PutRequest),
    Remove(RemoveRequest),
    MultiGet(MultiGetRequest),
    MultiPut(MultiPutRequest),
    MultiRemove(MultiRemoveRequest),
    Ttl(TtlRequest),
    SortkeyCount(SortkeyCountRequest),
    Scan(ScanRequest),
    ScanContinue(ScanContinueRequest),
    ScanCancel(ScanCancelRequest),
    QueryConfig(QueryConfigRequest),
}

impl RequestBody {
    /// The wire method name of this request.
    pub fn method(&self) -> &'static str {
        match self {
            RequestBody::Get(_) => METHOD_GET,
            RequestBody::Put(_) => METHOD_PUT,
            RequestBody::Remove(_) => METHOD_REMOVE,
            RequestBody::MultiGet(_) => METHOD_MULTI_GET,
            RequestBody::MultiPut(_) => METHOD_MULTI_PUT,
            RequestBody::MultiRemove(_) => METHOD_MULTI_REMOVE,
            RequestBody::Ttl(_) => METHOD_TTL,
            RequestBody::SortkeyCount(_) => METHOD_SORTKEY_COUNT,
            RequestBody::Scan(_) => METHOD_SCAN,
            RequestBody::ScanContinue(_) => METHOD_SCAN_CONTINUE,
            RequestBody::ScanCancel(_) => METHOD_SCAN_CANCEL,
            RequestBody::QueryConfig(_) => METHOD_QUERY_CONFIG,
        }
    }
}

/// Typed result structure of every REPLY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Get(GetResponse),
    Put(PutResponse),
    Remove(RemoveResponse),
    MultiGet(MultiGetResponse),
    MultiPut(MultiPutResponse),
    MultiRemove(MultiRemoveResponse),
    Ttl(TtlResponse),
    SortkeyCount(SortkeyCountResponse),
    Scan(ScanResponse),
    ScanCancel(ScanCancelResponse),
    QueryConfig(QueryConfigResponse),
}

impl ResponseBody {
    /// The application error code carried by this reply.
    pub fn error_code(&self) -> i32 {
        match self {
            ResponseBody::Get(r) => r.error,
            ResponseBody::Put(r) => r.error,
            ResponseBody::Remove(r) => r.error,
            ResponseBody::MultiGet(r) => r.error,
            ResponseBody::MultiPut(r) => r.error,
            ResponseBody::MultiRemove(r) => r.error,
            ResponseBody::Ttl(r) => r.error,
            ResponseBody::SortkeyCount(r) => r.error,
            ResponseBody::Scan(r) => r.error,
            ResponseBody::ScanCancel(r) => r.error,
            ResponseBody::QueryConfig(_) => ERR_OK,
        }
    }
}
