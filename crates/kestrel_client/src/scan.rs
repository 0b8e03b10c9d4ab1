//! Scan engine: range cursors over one or many partitions.
//!
//! A bounded scanner walks a single partition between two composite keys,
//! consuming server batches and continuation contexts. An unordered set of
//! scanners splits the table's partitions round-robin into independent
//! cursors that each walk their partitions sequentially.
//!
//! Cursors are monotone: every continuation either advances the local start
//! key or consumes a server context. A lost server context (failover,
//! expiry) falls back to a fresh scan from the last delivered key.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use kestrel_common::KestrelResult;
use kestrel_proto::key;
use kestrel_proto::types::{
    self as wire, RequestBody, ResponseBody, ScanCancelRequest, ScanContinueRequest, ScanRequest,
};

use crate::client::{app_error, unexpected_reply};
use crate::executor::{OpRunner, RouteSpec};
use crate::table::TableHandle;

/// No server context held.
const NO_CONTEXT: i64 = -1;

/// Deadline for fire-and-forget cancel RPCs issued on drop.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(1);

/// Scan tuning knobs.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Records per scan RPC.
    pub batch_size: u32,
    /// Whether the start bound itself is returned.
    pub start_inclusive: bool,
    /// Whether the stop bound itself is returned.
    pub stop_inclusive: bool,
    /// Sort-key-only projection: values come back empty.
    pub no_value: bool,
    /// Skip records last modified before this epoch-second (0 = no filter).
    pub min_modified_ts: u64,
    /// Per scan-RPC deadline; zero means the client default.
    pub timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            start_inclusive: true,
            stop_inclusive: false,
            no_value: false,
            min_modified_ts: 0,
            timeout: Duration::ZERO,
        }
    }
}

/// One decoded scan record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanItem {
    pub hash_key: Vec<u8>,
    pub sort_key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Per-partition slice of a scanner's key space.
struct ScanSegment {
    partition_index: u32,
    cursor_key: Vec<u8>,
    cursor_inclusive: bool,
    /// Empty means "+∞".
    stop_key: Vec<u8>,
    stop_inclusive: bool,
}

/// A pull cursor over one or more partitions.
///
/// Once exhausted, further [`Scanner::next`] calls keep returning `Ok(None)`.
pub struct Scanner {
    runner: Arc<OpRunner>,
    table: Arc<TableHandle>,
    options: ScanOptions,
    segments: Vec<ScanSegment>,
    current: usize,
    context_id: i64,
    buffer: VecDeque<ScanItem>,
    done: bool,
}

impl Scanner {
    /// Cursor over one hashKey's sortKey range `[start_sort, stop_sort)`
    /// (bound inclusivity per `options`). An empty `stop_sort` means "to
    /// the end of the hashKey", via its upper bound.
    pub(crate) fn bounded(
        runner: Arc<OpRunner>,
        table: Arc<TableHandle>,
        hash_key: &[u8],
        start_sort: &[u8],
        stop_sort: &[u8],
        options: ScanOptions,
    ) -> KestrelResult<Self> {
        let cursor_key = key::encode_key(hash_key, start_sort)?;
        let stop_key = if stop_sort.is_empty() {
            key::hash_key_upper_bound(hash_key)?
        } else {
            key::encode_key(hash_key, stop_sort)?
        };

        // Degenerate ranges produce an already-exhausted cursor.
        let empty = if stop_key.is_empty() {
            false
        } else {
            match key::byte_compare(&cursor_key, &stop_key) {
                Ordering::Greater => true,
                Ordering::Equal => !(options.start_inclusive && options.stop_inclusive),
                Ordering::Less => false,
            }
        };

        let hash = key::partition_hash(&cursor_key)?;
        let partition_index = key::partition_index(hash, table.partition_count());
        let segment = ScanSegment {
            partition_index,
            cursor_key,
            cursor_inclusive: options.start_inclusive,
            stop_key,
            stop_inclusive: options.stop_inclusive,
        };
        Ok(Self {
            runner,
            table,
            options,
            segments: vec![segment],
            current: 0,
            context_id: NO_CONTEXT,
            buffer: VecDeque::new(),
            done: empty,
        })
    }

    /// Split the table's partitions round-robin into at most `max_split`
    /// independent full-range cursors.
    pub(crate) fn unordered(
        runner: Arc<OpRunner>,
        table: Arc<TableHandle>,
        max_split: usize,
        options: ScanOptions,
    ) -> Vec<Self> {
        let partition_count = table.partition_count();
        let buckets = max_split.max(1).min(partition_count as usize);
        (0..buckets)
            .map(|bucket| {
                let segments = (0..partition_count)
                    .filter(|index| *index as usize % buckets == bucket)
                    .map(|partition_index| ScanSegment {
                        partition_index,
                        // The smallest possible wire key: every record sorts
                        // at or after the empty composite key.
                        cursor_key: vec![0x00, 0x00],
                        cursor_inclusive: true,
                        stop_key: Vec::new(),
                        stop_inclusive: false,
                    })
                    .collect::<Vec<_>>();
                Self {
                    runner: runner.clone(),
                    table: table.clone(),
                    options: options.clone(),
                    segments,
                    current: 0,
                    context_id: NO_CONTEXT,
                    buffer: VecDeque::new(),
                    done: false,
                }
            })
            .collect()
    }

    /// Pull the next record, issuing scan RPCs as needed. Returns `Ok(None)`
    /// once the cursor is exhausted, idempotently.
    pub async fn next(&mut self) -> KestrelResult<Option<ScanItem>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_more().await?;
        }
    }

    /// Drain the whole cursor into memory. Intended for tests and small
    /// ranges; large scans should pull with [`Scanner::next`].
    pub async fn collect_all(&mut self) -> KestrelResult<Vec<ScanItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn fetch_more(&mut self) -> KestrelResult<()> {
        if self.current >= self.segments.len() {
            self.done = true;
            return Ok(());
        }

        let (partition_index, request_ctx) = {
            let segment = &self.segments[self.current];
            (segment.partition_index, self.context_id)
        };

        let response = if request_ctx >= 0 {
            self.runner
                .execute(
                    &self.table,
                    RouteSpec::Index(partition_index),
                    self.options.timeout,
                    move |gpid| {
                        RequestBody::ScanContinue(ScanContinueRequest {
                            gpid,
                            context_id: request_ctx,
                        })
                    },
                )
                .await?
        } else {
            let segment = &self.segments[self.current];
            let start_key = segment.cursor_key.clone();
            let stop_key = segment.stop_key.clone();
            let start_inclusive = segment.cursor_inclusive;
            let stop_inclusive = segment.stop_inclusive;
            let batch_size = self.options.batch_size;
            let no_value = self.options.no_value;
            let min_modified_ts = self.options.min_modified_ts;
            self.runner
                .execute(
                    &self.table,
                    RouteSpec::Index(partition_index),
                    self.options.timeout,
                    move |gpid| {
                        RequestBody::Scan(ScanRequest {
                            gpid,
                            start_key: start_key.clone(),
                            stop_key: stop_key.clone(),
                            start_inclusive,
                            stop_inclusive,
                            batch_size,
                            no_value,
                            min_modified_ts,
                        })
                    },
                )
                .await?
        };

        let ResponseBody::Scan(scan) = response else {
            return Err(unexpected_reply("scan"));
        };

        match scan.error {
            wire::ERR_OK => {
                self.context_id = scan.context_id;
                if scan.kvs.is_empty() && scan.context_id < 0 {
                    self.advance_segment();
                    return Ok(());
                }
                for kv in &scan.kvs {
                    let (hash_key, sort_key) = key::decode_key(&kv.key)?;
                    self.buffer.push_back(ScanItem {
                        hash_key,
                        sort_key,
                        value: kv.value.clone(),
                    });
                }
                if let Some(last) = scan.kvs.last() {
                    let segment = &mut self.segments[self.current];
                    segment.cursor_key = last.key.clone();
                    segment.cursor_inclusive = false;
                }
                Ok(())
            }
            wire::ERR_SCAN_CONTEXT_GONE => {
                // The replica dropped our cursor (expiry or failover).
                // Restart from the last delivered key on the next fetch.
                tracing::debug!(
                    table = %self.table.name(),
                    partition = partition_index,
                    "scan context gone, restarting from cursor"
                );
                self.context_id = NO_CONTEXT;
                Ok(())
            }
            code => Err(app_error(code)),
        }
    }

    fn advance_segment(&mut self) {
        self.current += 1;
        self.context_id = NO_CONTEXT;
        if self.current >= self.segments.len() {
            self.done = true;
        }
    }
}

impl Drop for Scanner {
    /// Release a live server context, best-effort.
    fn drop(&mut self) {
        if self.context_id < 0 || self.current >= self.segments.len() {
            return;
        }
        let runner = self.runner.clone();
        let table = self.table.clone();
        let partition_index = self.segments[self.current].partition_index;
        let context_id = self.context_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = runner
                    .execute(
                        &table,
                        RouteSpec::Index(partition_index),
                        CANCEL_TIMEOUT,
                        move |gpid| {
                            RequestBody::ScanCancel(ScanCancelRequest { gpid, context_id })
                        },
                    )
                    .await;
            });
        }
    }
}
