//! HTTP surface for firmnode.
//!
//! Exposes the bridge's operations as a small JSON API and carries the
//! node configuration that wires the bridge to its backends.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{BridgeSection, LedgerConfig, NodeConfig, ServerConfig, StoreConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::{build_bridge, FirmServer};
