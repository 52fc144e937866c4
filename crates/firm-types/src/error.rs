use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid content id: {0}")]
    InvalidCid(String),

    #[error("unsupported multihash code {0:#x}")]
    UnsupportedHash(u64),

    #[error("serialization error: {0}")]
    Serialization(String),
}
