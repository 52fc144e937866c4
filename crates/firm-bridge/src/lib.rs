//! Core of firmnode.
//!
//! The [`Bridge`] owns an object store, a ledger client and a contract
//! deployer and keeps one directory per contract under `/.firm`:
//!
//! - [`Bridge::update_entry`] points a contract's entry at the root CID the
//!   ledger reports; [`RootSync`] drives it from `SetRoot` events
//! - [`Bridge::send`] validates a message, archives it, submits it, records
//!   it once applied and sets up directories for contracts it created
//! - [`Bridge::import`] places a CAR bundle into a contract's directory
//! - The read helpers resolve paths and blocks for serving

mod bridge;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod import;
pub mod layout;
pub mod locks;
pub mod pipeline;
pub mod read;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use directory::{DirectoryReport, Placement};
pub use dispatcher::{RootDispatcher, RootSync};
pub use entry::EntryUpdate;
pub use error::{BridgeError, BridgeResult};
pub use import::ImportResult;
pub use layout::ContractPaths;
pub use read::FirmBlockstore;
