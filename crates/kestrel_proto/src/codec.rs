//! Encode/decode for the Kestrel wire protocol.
//!
//! All multi-byte integers are big-endian. Every message is framed as:
//! `[length: u32 BE][kind: u8][method: u16-len string][seqid: u64 BE][body]`
//! where `length` counts everything after itself. Framing preserves message
//! boundaries; decoding a partial buffer reports `Truncated` so a stream
//! reader can accumulate.

use bytes::{BufMut, BytesMut};

use kestrel_common::types::{Gpid, TableId};

use crate::error::ProtoError;
use crate::types::*;

type Result<T> = std::result::Result<T, ProtoError>;

// ── Helper: read/write primitives ────────────────────────────────────────

fn ensure(buf: &[u8], need: usize) -> Result<()> {
    if buf.len() < need {
        return Err(ProtoError::Truncated {
            expected: need,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn read_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1)?;
    let v = buf[0];
    *buf = &buf[1..];
    Ok(v)
}

fn read_bool(buf: &mut &[u8]) -> Result<bool> {
    Ok(read_u8(buf)? != 0)
}

fn read_u16(buf: &mut &[u8]) -> Result<u16> {
    ensure(buf, 2)?;
    let v = u16::from_be_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(v)
}

fn read_u32(buf: &mut &[u8]) -> Result<u32> {
    ensure(buf, 4)?;
    let v = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_u64(buf: &mut &[u8]) -> Result<u64> {
    ensure(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(u64::from_be_bytes(arr))
}

fn read_i32(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4)?;
    let v = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_i64(buf: &mut &[u8]) -> Result<i64> {
    ensure(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(i64::from_be_bytes(arr))
}

fn read_blob(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_u32(buf)? as usize;
    ensure(buf, len)?;
    let v = buf[..len].to_vec();
    *buf = &buf[len..];
    Ok(v)
}

fn read_string_u16(buf: &mut &[u8], field: &'static str) -> Result<String> {
    let len = read_u16(buf)? as usize;
    ensure(buf, len)?;
    let bytes = buf[..len].to_vec();
    *buf = &buf[len..];
    String::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8 { field })
}

fn read_blob_list(buf: &mut &[u8]) -> Result<Vec<Vec<u8>>> {
    let n = read_u32(buf)? as usize;
    let mut out = Vec::with_capacity(n.min(65536));
    for _ in 0..n {
        out.push(read_blob(buf)?);
    }
    Ok(out)
}

fn read_kv_list(buf: &mut &[u8]) -> Result<Vec<KeyValue>> {
    let n = read_u32(buf)? as usize;
    let mut out = Vec::with_capacity(n.min(65536));
    for _ in 0..n {
        let key = read_blob(buf)?;
        let value = read_blob(buf)?;
        out.push(KeyValue { key, value });
    }
    Ok(out)
}

fn read_gpid(buf: &mut &[u8]) -> Result<Gpid> {
    let table_id = read_i32(buf)?;
    let partition_index = read_u32(buf)?;
    Ok(Gpid::new(TableId(table_id), partition_index))
}

fn write_blob(out: &mut BytesMut, b: &[u8]) {
    out.put_u32(b.len() as u32);
    out.put_slice(b);
}

fn write_string_u16(out: &mut BytesMut, s: &str) {
    out.put_u16(s.len() as u16);
    out.put_slice(s.as_bytes());
}

fn write_blob_list(out: &mut BytesMut, list: &[Vec<u8>]) {
    out.put_u32(list.len() as u32);
    for b in list {
        write_blob(out, b);
    }
}

fn write_kv_list(out: &mut BytesMut, kvs: &[KeyValue]) {
    out.put_u32(kvs.len() as u32);
    for kv in kvs {
        write_blob(out, &kv.key);
        write_blob(out, &kv.value);
    }
}

fn write_gpid(out: &mut BytesMut, gpid: Gpid) {
    out.put_i32(gpid.table_id.0);
    out.put_u32(gpid.partition_index);
}

// ── Request body encode/decode ───────────────────────────────────────────

fn encode_request_payload(body: &RequestBody) -> BytesMut {
    let mut out = BytesMut::with_capacity(64);
    match body {
        RequestBody::Get(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.key);
        }
        RequestBody::Put(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.key);
            write_blob(&mut out, &r.value);
            out.put_u32(r.ttl_seconds);
        }
        RequestBody::Remove(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.key);
        }
        RequestBody::MultiGet(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.hash_key);
            write_blob_list(&mut out, &r.sort_keys);
            out.put_i32(r.max_kv_count);
            out.put_i32(r.max_kv_size);
            out.put_u8(r.no_value as u8);
        }
        RequestBody::MultiPut(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.hash_key);
            write_kv_list(&mut out, &r.kvs);
            out.put_u32(r.ttl_seconds);
        }
        RequestBody::MultiRemove(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.hash_key);
            write_blob_list(&mut out, &r.sort_keys);
        }
        RequestBody::Ttl(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.key);
        }
        RequestBody::SortkeyCount(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.hash_key);
        }
        RequestBody::Scan(r) => {
            write_gpid(&mut out, r.gpid);
            write_blob(&mut out, &r.start_key);
            write_blob(&mut out, &r.stop_key);
            out.put_u8(r.start_inclusive as u8);
            out.put_u8(r.stop_inclusive as u8);
            out.put_u32(r.batch_size);
            out.put_u8(r.no_value as u8);
            out.put_u64(r.min_modified_ts);
        }
        RequestBody::ScanContinue(r) => {
            write_gpid(&mut out, r.gpid);
            out.put_i64(r.context_id);
        }
        RequestBody::ScanCancel(r) => {
            write_gpid(&mut out, r.gpid);
            out.put_i64(r.context_id);
        }
        RequestBody::QueryConfig(r) => {
            write_string_u16(&mut out, &r.table_name);
        }
    }
    out
}

/// Decode a CALL payload for the given method (server side).
pub fn decode_request(method: &str, payload: &[u8]) -> Result<RequestBody> {
    let mut buf = payload;
    let body = match method {
        METHOD_GET => RequestBody::Get(GetRequest {
            gpid: read_gpid(&mut buf)?,
            key: read_blob(&mut buf)?,
        }),
        METHOD_PUT => RequestBody::Put(PutRequest {
            gpid: read_gpid(&mut buf)?,
            key: read_blob(&mut buf)?,
            value: read_blob(&mut buf)?,
            ttl_seconds: read_u32(&mut buf)?,
        }),
        METHOD_REMOVE => RequestBody::Remove(RemoveRequest {
            gpid: read_gpid(&mut buf)?,
            key: read_blob(&mut buf)?,
        }),
        METHOD_MULTI_GET => RequestBody::MultiGet(MultiGetRequest {
            gpid: read_gpid(&mut buf)?,
            hash_key: read_blob(&mut buf)?,
            sort_keys: read_blob_list(&mut buf)?,
            max_kv_count: read_i32(&mut buf)?,
            max_kv_size: read_i32(&mut buf)?,
            no_value: read_bool(&mut buf)?,
        }),
        METHOD_MULTI_PUT => RequestBody::MultiPut(MultiPutRequest {
            gpid: read_gpid(&mut buf)?,
            hash_key: read_blob(&mut buf)?,
            kvs: read_kv_list(&mut buf)?,
            ttl_seconds: read_u32(&mut buf)?,
        }),
        METHOD_MULTI_REMOVE => RequestBody::MultiRemove(MultiRemoveRequest {
            gpid: read_gpid(&mut buf)?,
            hash_key: read_blob(&mut buf)?,
            sort_keys: read_blob_list(&mut buf)?,
        }),
        METHOD_TTL => RequestBody::Ttl(TtlRequest {
            gpid: read_gpid(&mut buf)?,
            key: read_blob(&mut buf)?,
        }),
        METHOD_SORTKEY_COUNT => RequestBody::SortkeyCount(SortkeyCountRequest {
            gpid: read_gpid(&mut buf)?,
            hash_key: read_blob(&mut buf)?,
        }),
        METHOD_SCAN => RequestBody::Scan(ScanRequest {
            gpid: read_gpid(&mut buf)?,
            start_key: read_blob(&mut buf)?,
            stop_key: read_blob(&mut buf)?,
            start_inclusive: read_bool(&mut buf)?,
            stop_inclusive: read_bool(&mut buf)?,
            batch_size: read_u32(&mut buf)?,
            no_value: read_bool(&mut buf)?,
            min_modified_ts: read_u64(&mut buf)?,
        }),
        METHOD_SCAN_CONTINUE => RequestBody::ScanContinue(ScanContinueRequest {
            gpid: read_gpid(&mut buf)?,
            context_id: read_i64(&mut buf)?,
        }),
        METHOD_SCAN_CANCEL => RequestBody::ScanCancel(ScanCancelRequest {
            gpid: read_gpid(&mut buf)?,
            context_id: read_i64(&mut buf)?,
        }),
        METHOD_QUERY_CONFIG => RequestBody::QueryConfig(QueryConfigRequest {
            table_name: read_string_u16(&mut buf, "table_name")?,
        }),
        other => return Err(ProtoError::UnknownMethod(other.to_string())),
    };
    Ok(body)
}

// ── Response body encode/decode ──────────────────────────────────────────

fn encode_response_payload(body: &ResponseBody) -> BytesMut {
    let mut out = BytesMut::with_capacity(64);
    match body {
        ResponseBody::Get(r) => {
            out.put_i32(r.error);
            write_blob(&mut out, &r.value);
        }
        ResponseBody::Put(r) => out.put_i32(r.error),
        ResponseBody::Remove(r) => out.put_i32(r.error),
        ResponseBody::MultiGet(r) => {
            out.put_i32(r.error);
            write_kv_list(&mut out, &r.kvs);
        }
        ResponseBody::MultiPut(r) => out.put_i32(r.error),
        ResponseBody::MultiRemove(r) => {
            out.put_i32(r.error);
            out.put_i64(r.count);
        }
        ResponseBody::Ttl(r) => {
            out.put_i32(r.error);
            out.put_i32(r.ttl_seconds);
        }
        ResponseBody::SortkeyCount(r) => {
            out.put_i32(r.error);
            out.put_i64(r.count);
        }
        ResponseBody::Scan(r) => {
            out.put_i32(r.error);
            write_kv_list(&mut out, &r.kvs);
            out.put_i64(r.context_id);
        }
        ResponseBody::ScanCancel(r) => out.put_i32(r.error),
        ResponseBody::QueryConfig(r) => {
            out.put_i32(r.status);
            write_string_u16(&mut out, &r.hinted_primary);
            out.put_i32(r.table_id);
            out.put_u32(r.partition_count);
            out.put_u64(r.version);
            out.put_u32(r.partitions.len() as u32);
            for p in &r.partitions {
                out.put_u32(p.partition_index);
                out.put_i64(p.ballot);
                write_string_u16(&mut out, &p.primary);
            }
        }
    }
    out
}

/// Decode a REPLY payload for the given method (client side).
pub fn decode_response(method: &str, payload: &[u8]) -> Result<ResponseBody> {
    let mut buf = payload;
    let body = match method {
        METHOD_GET => ResponseBody::Get(GetResponse {
            error: read_i32(&mut buf)?,
            value: read_blob(&mut buf)?,
        }),
        METHOD_PUT => ResponseBody::Put(PutResponse {
            error: read_i32(&mut buf)?,
        }),
        METHOD_REMOVE => ResponseBody::Remove(RemoveResponse {
            error: read_i32(&mut buf)?,
        }),
        METHOD_MULTI_GET => ResponseBody::MultiGet(MultiGetResponse {
            error: read_i32(&mut buf)?,
            kvs: read_kv_list(&mut buf)?,
        }),
        METHOD_MULTI_PUT => ResponseBody::MultiPut(MultiPutResponse {
            error: read_i32(&mut buf)?,
        }),
        METHOD_MULTI_REMOVE => ResponseBody::MultiRemove(MultiRemoveResponse {
            error: read_i32(&mut buf)?,
            count: read_i64(&mut buf)?,
        }),
        METHOD_TTL => ResponseBody::Ttl(TtlResponse {
            error: read_i32(&mut buf)?,
            ttl_seconds: read_i32(&mut buf)?,
        }),
        METHOD_SORTKEY_COUNT => ResponseBody::SortkeyCount(SortkeyCountResponse {
            error: read_i32(&mut buf)?,
            count: read_i64(&mut buf)?,
        }),
        METHOD_SCAN | METHOD_SCAN_CONTINUE => ResponseBody::Scan(ScanResponse {
            error: read_i32(&mut buf)?,
            kvs: read_kv_list(&mut buf)?,
            context_id: read_i64(&mut buf)?,
        }),
        METHOD_SCAN_CANCEL => ResponseBody::ScanCancel(ScanCancelResponse {
            error: read_i32(&mut buf)?,
        }),
        METHOD_QUERY_CONFIG => {
            let status = read_i32(&mut buf)?;
            let hinted_primary = read_string_u16(&mut buf, "hinted_primary")?;
            let table_id = read_i32(&mut buf)?;
            let partition_count = read_u32(&mut buf)?;
            let version = read_u64(&mut buf)?;
            let n = read_u32(&mut buf)? as usize;
            let mut partitions = Vec::with_capacity(n.min(65536));
            for _ in 0..n {
                partitions.push(PartitionConfig {
                    partition_index: read_u32(&mut buf)?,
                    ballot: read_i64(&mut buf)?,
                    primary: read_string_u16(&mut buf, "primary")?,
                });
            }
            ResponseBody::QueryConfig(QueryConfigResponse {
                status,
                hinted_primary,
                table_id,
                partition_count,
                version,
                partitions,
            })
        }
        other => return Err(ProtoError::UnknownMethod(other.to_string())),
    };
    Ok(body)
}

// ── Exception body encode/decode ─────────────────────────────────────────

fn encode_exception_payload(exc: &RemoteException) -> BytesMut {
    let mut out = BytesMut::with_capacity(16 + exc.message.len());
    out.put_i32(exc.code);
    write_string_u16(&mut out, &exc.message);
    out
}

/// Decode an EXCEPTION payload.
pub fn decode_exception(payload: &[u8]) -> Result<RemoteException> {
    let mut buf = payload;
    Ok(RemoteException {
        code: read_i32(&mut buf)?,
        message: read_string_u16(&mut buf, "exception_message")?,
    })
}

// ── Framing ──────────────────────────────────────────────────────────────

/// A decoded frame header plus its raw body payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub method: String,
    pub seqid: u64,
    pub payload: Vec<u8>,
}

fn encode_frame(kind: MessageKind, method: &str, seqid: u64, payload: &[u8]) -> BytesMut {
    let inner = 1 + 2 + method.len() + 8 + payload.len();
    let mut frame = BytesMut::with_capacity(FRAME_LEN_PREFIX + inner);
    frame.put_u32(inner as u32);
    frame.put_u8(kind.as_u8());
    write_string_u16(&mut frame, method);
    frame.put_u64(seqid);
    frame.put_slice(payload);
    frame
}

/// Encode a CALL frame for a request body.
pub fn encode_call(seqid: u64, body: &RequestBody) -> BytesMut {
    let payload = encode_request_payload(body);
    encode_frame(MessageKind::Call, body.method(), seqid, &payload)
}

/// Encode a REPLY frame, echoing the request's method name.
pub fn encode_reply(method: &str, seqid: u64, body: &ResponseBody) -> BytesMut {
    let payload = encode_response_payload(body);
    encode_frame(MessageKind::Reply, method, seqid, &payload)
}

/// Encode an EXCEPTION frame, echoing the request's method name.
pub fn encode_exception(method: &str, seqid: u64, code: i32, message: &str) -> BytesMut {
    let payload = encode_exception_payload(&RemoteException {
        code,
        message: message.to_string(),
    });
    encode_frame(MessageKind::Exception, method, seqid, &payload)
}

/// Decode one frame from the head of `input`.
///
/// Returns `(frame, bytes_consumed)`; `Truncated` means the buffer does not
/// yet hold a complete frame and the caller should read more bytes.
pub fn decode_frame(input: &[u8]) -> Result<(Frame, usize)> {
    if input.len() < FRAME_LEN_PREFIX {
        return Err(ProtoError::Truncated {
            expected: FRAME_LEN_PREFIX,
            actual: input.len(),
        });
    }
    let length = u32::from_be_bytes([input[0], input[1], input[2], input[3]]);
    if length > MAX_FRAME_SIZE {
        return Err(ProtoError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    let total = FRAME_LEN_PREFIX + length as usize;
    if input.len() < total {
        return Err(ProtoError::Truncated {
            expected: total,
            actual: input.len(),
        });
    }

    let mut buf = &input[FRAME_LEN_PREFIX..total];
    let kind = MessageKind::from_u8(read_u8(&mut buf)?)?;
    let method = read_string_u16(&mut buf, "method")?;
    let seqid = read_u64(&mut buf)?;
    let payload = buf.to_vec();

    Ok((
        Frame {
            kind,
            method,
            seqid,
            payload,
        },
        total,
    ))
}

// ── Tests ────────────────────────────────────────────────────────────────
