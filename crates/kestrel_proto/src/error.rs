//! Error types for the wire codec.

use thiserror::Error;

use kestrel_common::error::KestrelError;

/// Errors that can occur during protocol encode/decode.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Truncated message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("Unknown message kind: 0x{0:02x}")]
    UnknownMessageKind(u8),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid UTF-8 in field '{field}'")]
    InvalidUtf8 { field: &'static str },

    #[error("Corruption: {0}")]
    Corruption(String),
}

impl ProtoError {
    /// Whether more bytes may fix the problem (stream reassembly).
    pub fn is_truncated(&self) -> bool {
        matches!(self, ProtoError::Truncated { .. })
    }
}

impl From<ProtoError> for KestrelError {
    fn from(e: ProtoError) -> Self {
        match e {
            ProtoError::InvalidKey(msg) => KestrelError::InvalidArgument(msg),
            other => KestrelError::Proto(other.to_string()),
        }
    }
}
