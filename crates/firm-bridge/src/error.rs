use firm_ledger::LedgerError;
use firm_store::StoreError;
use firm_types::{TypeError, ValidationReport};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Rejected before any side effect: missing directory, malformed
    /// bundle, bad CID or address.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The message failed schema validation.
    #[error("Could not validate: {0}")]
    Validation(ValidationReport),

    /// The filesystem contract is not known yet.
    #[error("bridge not initialized")]
    NotInitialized,

    #[error("not found: {0}")]
    NotFound(String),

    /// A namespace name is taken by different content.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::InvalidBundle(reason) => Self::InvalidArgument(reason),
            other => Self::Store(other),
        }
    }
}

impl From<TypeError> for BridgeError {
    fn from(e: TypeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
