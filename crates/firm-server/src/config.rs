use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use firm_bridge::BridgeConfig;
use firm_ledger::DeployerConfig;
use firm_types::{decode_hex, Address, Bytes32};

use crate::error::{ServerError, ServerResult};

/// Well-known deterministic deployment proxy.
const DEFAULT_FACTORY: Address = Address::new([
    0x4e, 0x59, 0xb4, 0x48, 0x47, 0xb3, 0x79, 0x57, 0x85, 0x88, 0x92, 0x0c, 0xa7, 0x8f, 0xbf, 0x26,
    0xc0, 0xb4, 0x95, 0x6c,
]);

/// Complete node configuration, usually loaded from `firmnode.toml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
    pub bridge: BridgeSection,
}

impl NodeConfig {
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        self.bridge.to_bridge_config(self.ledger.poll_interval())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest accepted request body, which bounds imported bundles.
    pub max_bundle_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 60500)),
            max_bundle_size: 32 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Kubo RPC endpoint.
    pub api_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001/api/v0".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Sending account; the node's first account when absent.
    pub from: Option<Address>,
    pub poll_interval_ms: u64,
    pub factory_address: Address,
    /// Hex-encoded signed transaction deploying the factory.
    pub factory_deployment_tx: String,
    pub filesystem_salt: Bytes32,
    /// Hex-encoded creation code of the filesystem contract.
    pub filesystem_init_code: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:60501".into(),
            from: None,
            poll_interval_ms: 500,
            factory_address: DEFAULT_FACTORY,
            factory_deployment_tx: String::new(),
            filesystem_salt: Bytes32::zero(),
            filesystem_init_code: String::new(),
        }
    }
}

impl LedgerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn deployer_config(&self) -> ServerResult<DeployerConfig> {
        let hex = |field: &str, value: &str| {
            decode_hex(value.trim()).map_err(|e| ServerError::Config(format!("ledger.{field}: {e}")))
        };
        Ok(DeployerConfig {
            factory_address: self.factory_address,
            factory_deployment_tx: hex("factory_deployment_tx", &self.factory_deployment_tx)?,
            filesystem_salt: self.filesystem_salt,
            filesystem_init_code: hex("filesystem_init_code", &self.filesystem_init_code)?,
            poll_interval: self.poll_interval(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub event_channel_capacity: usize,
    pub receipt_timeout_secs: Option<u64>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            event_channel_capacity: defaults.event_channel_capacity,
            receipt_timeout_secs: None,
        }
    }
}

impl BridgeSection {
    pub fn to_bridge_config(&self, poll_interval: Duration) -> BridgeConfig {
        BridgeConfig {
            poll_interval,
            receipt_timeout: self.receipt_timeout_secs.map(Duration::from_secs),
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}
