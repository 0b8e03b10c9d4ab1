//! Identifier newtypes shared across the client crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub i32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic term number distinguishing successive primaries of a partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Ballot(pub i64);

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global partition id: the (table, partition) pair every storage RPC is
/// addressed to. The server rejects calls whose gpid no longer maps to a
/// partition it is primary for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gpid {
    pub table_id: TableId,
    pub partition_index: u32,
}

impl Gpid {
    pub fn new(table_id: TableId, partition_index: u32) -> Self {
        Self {
            table_id,
            partition_index,
        }
    }
}

impl fmt::Display for Gpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_id, self.partition_index)
    }
}
