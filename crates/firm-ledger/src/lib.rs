//! Ledger access for firmnode.
//!
//! This crate provides:
//! - The [`LedgerClient`] trait boundary: send, confirm, inspect code and logs
//! - [`JsonRpcLedger`] for an Ethereum JSON-RPC node
//! - [`InMemoryLedger`] for tests and embedding, with factory emulation
//! - Filesystem contract event codec (`SetRoot`, `AbiSignal`)
//! - CREATE2 address derivation and the [`ContractDeployer`] built on it
//! - [`RootWatcher`], which turns `SetRoot` logs into a stream of updates

pub mod create2;
pub mod deployer;
pub mod error;
pub mod events;
pub mod jsonrpc;
pub mod memory;
pub mod traits;
pub mod watcher;

pub use deployer::{ContractDeployer, Create2Deployer, DeployerConfig};
pub use error::{LedgerError, LedgerResult};
pub use events::{FsEvent, RootUpdate};
pub use firm_types::{Log, TransactionReceipt};
pub use jsonrpc::JsonRpcLedger;
pub use memory::{InMemoryLedger, TxOutcome};
pub use traits::{LedgerClient, LogFilter, TransactionRequest};
pub use watcher::RootWatcher;
