//! Synchronous wrappers over the async client.
//!
//! [`BlockingClient`] owns a private runtime sized by `async_workers` and
//! drives every facade operation with `block_on`; scans come back as
//! [`BlockingScanner`] pull cursors driven the same way. Must not be used
//! from inside another runtime; async callers use
//! [`KestrelClient`](crate::KestrelClient) directly.

use std::collections::HashMap;

use tokio::runtime::{Builder, Handle, Runtime};

use kestrel_common::{ClientConfig, KestrelError, KestrelResult};

use crate::client::{HashKeyData, KestrelClient, MultiGetResult, SetItem};
use crate::scan::{ScanItem, ScanOptions, Scanner};

pub struct BlockingClient {
    client: KestrelClient,
    runtime: Runtime,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> KestrelResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.async_workers)
            .thread_name("kestrel-client")
            .enable_all()
            .build()
            .map_err(|e| KestrelError::Config(format!("failed to build runtime: {e}")))?;
        let client = KestrelClient::new(config)?;
        Ok(Self { client, runtime })
    }

    pub fn from_properties(props: &HashMap<String, String>) -> KestrelResult<Self> {
        Self::new(ClientConfig::from_properties(props)?)
    }

    /// The async client backing this wrapper.
    pub fn async_client(&self) -> &KestrelClient {
        &self.client
    }

    /// One `key=value` line per recognized configuration key.
    pub fn config_summary(&self) -> String {
        self.client.config_summary()
    }

    // ── Point operations ─────────────────────────────────────────────────

    pub fn exist(&self, table: &str, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<bool> {
        self.runtime.block_on(self.client.exist(table, hash_key, sort_key))
    }

    pub fn get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
    ) -> KestrelResult<Option<Vec<u8>>> {
        self.runtime.block_on(self.client.get(table, hash_key, sort_key))
    }

    pub fn set(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
    ) -> KestrelResult<()> {
        self.runtime
            .block_on(self.client.set(table, hash_key, sort_key, value))
    }

    pub fn set_with_ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        self.runtime.block_on(
            self.client
                .set_with_ttl(table, hash_key, sort_key, value, ttl_seconds),
        )
    }

    pub fn del(&self, table: &str, hash_key: &[u8], sort_key: &[u8]) -> KestrelResult<()> {
        self.runtime.block_on(self.client.del(table, hash_key, sort_key))
    }

    pub fn ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
    ) -> KestrelResult<Option<i32>> {
        self.runtime.block_on(self.client.ttl(table, hash_key, sort_key))
    }

    pub fn sortkey_count(&self, table: &str, hash_key: &[u8]) -> KestrelResult<i64> {
        self.runtime.block_on(self.client.sortkey_count(table, hash_key))
    }

    // ── Multi-key operations ─────────────────────────────────────────────

    pub fn multi_get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<MultiGetResult> {
        self.runtime
            .block_on(self.client.multi_get(table, hash_key, sort_keys))
    }

    pub fn multi_get_sort_keys(
        &self,
        table: &str,
        hash_key: &[u8],
    ) -> KestrelResult<(Vec<Vec<u8>>, bool)> {
        self.runtime
            .block_on(self.client.multi_get_sort_keys(table, hash_key))
    }

    pub fn multi_set(
        &self,
        table: &str,
        hash_key: &[u8],
        kvs: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<()> {
        self.runtime
            .block_on(self.client.multi_set(table, hash_key, kvs))
    }

    pub fn multi_del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
    ) -> KestrelResult<i64> {
        self.runtime
            .block_on(self.client.multi_del(table, hash_key, sort_keys))
    }

    // ── Batch operations ─────────────────────────────────────────────────

    pub fn batch_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<Vec<Option<Vec<u8>>>> {
        self.runtime.block_on(self.client.batch_get(table, keys))
    }

    pub fn try_batch_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<(Vec<KestrelResult<Option<Vec<u8>>>>, usize)> {
        self.runtime.block_on(self.client.try_batch_get(table, keys))
    }

    pub fn batch_set(&self, table: &str, items: &[SetItem]) -> KestrelResult<()> {
        self.runtime.block_on(self.client.batch_set(table, items))
    }

    pub fn try_batch_set(
        &self,
        table: &str,
        items: &[SetItem],
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        self.runtime.block_on(self.client.try_batch_set(table, items))
    }

    pub fn batch_del(&self, table: &str, keys: &[(Vec<u8>, Vec<u8>)]) -> KestrelResult<()> {
        self.runtime.block_on(self.client.batch_del(table, keys))
    }

    pub fn try_batch_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<u8>)],
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        self.runtime.block_on(self.client.try_batch_del(table, keys))
    }

    pub fn batch_multi_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<Vec<HashKeyData>> {
        self.runtime.block_on(self.client.batch_multi_get(table, keys))
    }

    pub fn try_batch_multi_get(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<(Vec<KestrelResult<HashKeyData>>, usize)> {
        self.runtime
            .block_on(self.client.try_batch_multi_get(table, keys))
    }

    pub fn batch_multi_set(
        &self,
        table: &str,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> KestrelResult<()> {
        self.runtime
            .block_on(self.client.batch_multi_set(table, items, ttl_seconds))
    }

    pub fn try_batch_multi_set(
        &self,
        table: &str,
        items: &[HashKeyData],
        ttl_seconds: u32,
    ) -> KestrelResult<(Vec<KestrelResult<()>>, usize)> {
        self.runtime
            .block_on(self.client.try_batch_multi_set(table, items, ttl_seconds))
    }

    pub fn batch_multi_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<()> {
        self.runtime.block_on(self.client.batch_multi_del(table, keys))
    }

    pub fn try_batch_multi_del(
        &self,
        table: &str,
        keys: &[(Vec<u8>, Vec<Vec<u8>>)],
    ) -> KestrelResult<(Vec<KestrelResult<i64>>, usize)> {
        self.runtime
            .block_on(self.client.try_batch_multi_del(table, keys))
    }

    // ── Scans ────────────────────────────────────────────────────────────

    pub fn get_scanner(
        &self,
        table: &str,
        hash_key: &[u8],
        start_sort_key: &[u8],
        stop_sort_key: &[u8],
        options: ScanOptions,
    ) -> KestrelResult<BlockingScanner> {
        let scanner = self.runtime.block_on(self.client.get_scanner(
            table,
            hash_key,
            start_sort_key,
            stop_sort_key,
            options,
        ))?;
        Ok(self.adapt_scanner(scanner))
    }

    pub fn get_unordered_scanners(
        &self,
        table: &str,
        max_split_count: usize,
        options: ScanOptions,
    ) -> KestrelResult<Vec<BlockingScanner>> {
        let scanners = self.runtime.block_on(self.client.get_unordered_scanners(
            table,
            max_split_count,
            options,
        ))?;
        Ok(scanners
            .into_iter()
            .map(|scanner| self.adapt_scanner(scanner))
            .collect())
    }

    fn adapt_scanner(&self, scanner: Scanner) -> BlockingScanner {
        BlockingScanner {
            handle: self.runtime.handle().clone(),
            scanner: Some(scanner),
        }
    }

    pub fn close(&self) {
        self.client.close();
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        self.client.close();
    }
}

/// A scan cursor driven from synchronous code.
pub struct BlockingScanner {
    handle: Handle,
    /// Taken inside the runtime context on drop so the inner cursor can
    /// still fire its best-effort cancel RPC.
    scanner: Option<Scanner>,
}

impl BlockingScanner {
    /// Pull the next record; `Ok(None)` once exhausted, idempotently.
    pub fn next(&mut self) -> KestrelResult<Option<ScanItem>> {
        match self.scanner.as_mut() {
            Some(scanner) => self.handle.block_on(scanner.next()),
            None => Ok(None),
        }
    }

    /// Drain the whole cursor into memory.
    pub fn collect_all(&mut self) -> KestrelResult<Vec<ScanItem>> {
        match self.scanner.as_mut() {
            Some(scanner) => self.handle.block_on(scanner.collect_all()),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for BlockingScanner {
    fn drop(&mut self) {
        let _guard = self.handle.enter();
        self.scanner.take();
    }
}
