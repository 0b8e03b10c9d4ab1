//! Table handle: binds a table name to its cached partition map and the
//! routing function.

use std::sync::Arc;

use parking_lot::RwLock;

use kestrel_common::types::{Ballot, TableId};
use kestrel_common::{KestrelError, KestrelResult};
use kestrel_proto::key;
use kestrel_proto::types::QueryConfigResponse;

use crate::meta::MetaResolver;

/// One partition's routing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub ballot: Ballot,
    /// `host:port` of the current primary; `None` while the partition is
    /// between primaries.
    pub primary: Option<String>,
}

/// Immutable snapshot of a table's partition map. Handles swap whole
/// snapshots atomically; readers never observe a half-updated map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub table_id: TableId,
    pub partition_count: u32,
    pub version: u64,
    pub partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Validate and index a meta `query_config` response.
    pub fn from_response(table_name: &str, resp: QueryConfigResponse) -> KestrelResult<Self> {
        if resp.partition_count == 0 || !resp.partition_count.is_power_of_two() {
            return Err(KestrelError::Proto(format!(
                "table {table_name}: partition count {} is not a positive power of two",
                resp.partition_count
            )));
        }
        let mut partitions = vec![
            Partition {
                ballot: Ballot(0),
                primary: None,
            };
            resp.partition_count as usize
        ];
        for p in resp.partitions {
            let index = p.partition_index as usize;
            if index >= partitions.len() {
                return Err(KestrelError::Proto(format!(
                    "table {table_name}: partition index {index} out of range"
                )));
            }
            partitions[index] = Partition {
                ballot: Ballot(p.ballot),
                primary: if p.primary.is_empty() {
                    None
                } else {
                    Some(p.primary)
                },
            };
        }
        Ok(Self {
            table_id: TableId(resp.table_id),
            partition_count: resp.partition_count,
            version: resp.version,
            partitions,
        })
    }

    /// Primary endpoint of a partition, if it currently has one.
    pub fn primary_of(&self, partition_index: u32) -> Option<&str> {
        self.partitions
            .get(partition_index as usize)
            .and_then(|p| p.primary.as_deref())
    }
}

/// Shared, read-mostly binding of a table name to its partition map.
///
/// The held snapshot pointer is swapped atomically on refresh; concurrent
/// routers keep reading the previous snapshot until the swap lands.
pub struct TableHandle {
    name: String,
    resolver: Arc<MetaResolver>,
    snapshot: RwLock<Arc<PartitionTable>>,
}

impl TableHandle {
    /// Resolve the table's partition map and build a handle.
    pub async fn open(name: String, resolver: Arc<MetaResolver>) -> KestrelResult<Arc<Self>> {
        let snapshot = resolver.resolve(&name).await?;
        tracing::info!(
            table = %name,
            table_id = %snapshot.table_id,
            partition_count = snapshot.partition_count,
            version = snapshot.version,
            "table opened"
        );
        Ok(Arc::new(Self {
            name,
            resolver,
            snapshot: RwLock::new(snapshot),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_id(&self) -> TableId {
        self.snapshot.read().table_id
    }

    pub fn partition_count(&self) -> u32 {
        self.snapshot.read().partition_count
    }

    /// The current partition-map snapshot.
    pub fn snapshot(&self) -> Arc<PartitionTable> {
        self.snapshot.read().clone()
    }

    /// Map a partition hash to (partition_index, primary endpoint).
    pub fn route(&self, hash: u64) -> KestrelResult<(u32, String)> {
        let snapshot = self.snapshot();
        let index = key::partition_index(hash, snapshot.partition_count);
        match snapshot.primary_of(index) {
            Some(endpoint) => Ok((index, endpoint.to_string())),
            None => Err(KestrelError::routing_stale(
                format!("partition {}.{index} has no primary", snapshot.table_id),
                None,
            )),
        }
    }

    /// Primary endpoint of an explicit partition index (scan routing).
    pub fn route_index(&self, partition_index: u32) -> KestrelResult<String> {
        let snapshot = self.snapshot();
        if partition_index >= snapshot.partition_count {
            return Err(KestrelError::invalid_argument(format!(
                "partition index {partition_index} out of range (count {})",
                snapshot.partition_count
            )));
        }
        match snapshot.primary_of(partition_index) {
            Some(endpoint) => Ok(endpoint.to_string()),
            None => Err(KestrelError::routing_stale(
                format!("partition {}.{partition_index} has no primary", snapshot.table_id),
                None,
            )),
        }
    }

    /// Re-resolve the partition map and swap the snapshot in. Concurrent
    /// callers share one in-flight resolve. The swap is version-monotonic:
    /// an older map never replaces a newer one.
    pub async fn refresh(&self) -> KestrelResult<()> {
        let fresh = self.resolver.refresh(&self.name).await?;
        let mut snapshot = self.snapshot.write();
        if fresh.version >= snapshot.version {
            tracing::debug!(
                table = %self.name,
                old_version = snapshot.version,
                new_version = fresh.version,
                "partition map refreshed"
            );
            *snapshot = fresh;
        }
        Ok(())
    }
}
