//! Client runtime for the Kestrel distributed key-value store.
//!
//! Records are addressed by a composite (hashKey, sortKey); every record
//! under one hashKey lives in a single partition, which a cluster of meta
//! servers maps to its current primary replica. This crate turns user
//! operations into routed RPC calls, rides out stale partition maps and
//! transient transport faults, and layers batch and scan primitives on top.
//!
//! ```no_run
//! use kestrel_client::{ClientConfig, KestrelClient};
//!
//! # async fn demo() -> Result<(), kestrel_client::KestrelError> {
//! let config = ClientConfig::new(vec!["meta1:34601".into(), "meta2:34601".into()]);
//! let client = KestrelClient::new(config)?;
//! let table = client.open_table("usertable").await?;
//! table.set(b"alice", b"profile", b"{}").await?;
//! let value = table.get(b"alice", b"profile").await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod blocking;
pub mod client;
pub mod executor;
pub mod meta;
mod metrics;
pub mod pool;
pub mod scan;
pub mod session;
pub mod table;

pub use blocking::{BlockingClient, BlockingScanner};
pub use client::{HashKeyData, KestrelClient, MultiGetResult, SetItem, Table};
pub use kestrel_common::{ClientConfig, ErrorKind, KestrelError, KestrelResult};
pub use scan::{ScanItem, ScanOptions, Scanner};
