//! Wire protocol for the Kestrel key-value store.
//!
//! Three concerns live here, all independent of any I/O:
//! - [`key`]: the composite (hashKey, sortKey) encoding and the CRC-64
//!   partition hash,
//! - [`types`]: method names, error codes and the typed argument/result
//!   structures of every RPC,
//! - [`codec`]: binary encode/decode for frames and message bodies.

pub mod codec;
pub mod error;
pub mod key;
pub mod types;

pub use codec::{decode_frame, decode_response, encode_call, Frame};
pub use error::ProtoError;
pub use types::{MessageKind, RequestBody, ResponseBody};
