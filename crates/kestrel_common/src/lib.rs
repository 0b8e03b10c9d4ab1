//! Shared foundation for the Kestrel client: common identifier types, the
//! error taxonomy every layer converts into, and the client configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::ClientConfig;
pub use error::{ErrorKind, KestrelError, KestrelResult};
pub use types::{Ballot, Gpid, TableId};
