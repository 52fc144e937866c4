//! Foundation types for firmnode.
//!
//! Every other firmnode crate depends on `firm-types`.
//!
//! # Key Types
//!
//! - [`Address`] - 20-byte ledger address, canonical lowercase hex
//! - [`ContentId`] - CID normalized to v0 for dag-pb content
//! - [`Message`] / [`MessageCodec`] - message wire format and validator
//! - [`ContractSeed`] - inputs for initializing a contract directory
//! - [`TransactionReceipt`] / [`Log`] - ledger execution results
//! - [`SendResult`] - outcome of the message pipeline

pub mod address;
pub mod bytes;
pub mod cid;
pub mod error;
pub mod message;
pub mod receipt;
pub mod result;
pub mod seed;

pub use address::Address;
pub use bytes::{decode_hex, encode_hex, Bytes32};
pub use cid::ContentId;
pub use error::TypeError;
pub use message::{Message, MessageCodec, MessageKind, ValidationReport, Violation};
pub use receipt::{Log, TransactionReceipt};
pub use result::{CreatedContract, SendResult};
pub use seed::{ContractSeed, DeploymentRecord};

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
