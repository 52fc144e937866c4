use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use firm_ledger::{ContractDeployer, LedgerClient, RootWatcher};
use firm_store::ObjectStore;
use firm_types::{Address, ContractSeed, Message};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::locks::AddressLocks;

/// Mediator between the ledger and the object store.
///
/// Holds the backends behind trait objects so the same pipeline runs
/// against a Kubo node and a JSON-RPC ledger in production and against the
/// in-memory backends in tests.
pub struct Bridge {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) ledger: Arc<dyn LedgerClient>,
    pub(crate) deployer: Arc<dyn ContractDeployer>,
    pub(crate) config: BridgeConfig,
    pub(crate) locks: AddressLocks,
    fs_contract: OnceLock<Address>,
}

impl Bridge {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: Arc<dyn LedgerClient>,
        deployer: Arc<dyn ContractDeployer>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            deployer,
            config,
            locks: AddressLocks::new(),
            fs_contract: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn factory_address(&self) -> Address {
        self.deployer.factory_address()
    }

    /// Address of the filesystem contract, once [`init`](Self::init) ran.
    pub fn fs_contract(&self) -> BridgeResult<Address> {
        self.fs_contract
            .get()
            .copied()
            .ok_or(BridgeError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.fs_contract.get().is_some()
    }

    /// Bring the node up: deploy the factory if needed, give it a
    /// directory, then deploy or locate the filesystem contract.
    ///
    /// A failure to initialize the factory's directory is logged and does
    /// not abort startup. Safe to call more than once.
    pub async fn init(&self) -> BridgeResult<Address> {
        self.deployer.init().await?;

        let factory = self.deployer.factory_address();
        let seed = ContractSeed::inline(
            None,
            Message::pending_tx(factory, self.deployer.factory_deployment_tx().to_vec()),
        );
        if let Err(e) = self.init_contract_dir(factory, seed).await {
            warn!(%factory, error = %e, "failed initializing factory directory");
        }

        let fs = self.deployer.deploy_filesystem().await?;
        if self.fs_contract.set(fs).is_err() {
            let current = self.fs_contract()?;
            if current != fs {
                return Err(BridgeError::Internal(format!(
                    "filesystem contract moved from {current} to {fs}"
                )));
            }
        }
        info!(%factory, filesystem = %fs, "bridge initialized");
        Ok(fs)
    }

    /// Watcher for `SetRoot` events of the filesystem contract.
    pub fn root_watcher(&self) -> BridgeResult<RootWatcher> {
        Ok(RootWatcher::new(
            self.ledger.clone(),
            self.fs_contract()?,
            self.config.poll_interval,
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use firm_ledger::{Create2Deployer, DeployerConfig, InMemoryLedger};
    use firm_store::InMemoryObjectStore;
    use firm_types::Bytes32;

    use super::*;

    pub const FACTORY_TX: &[u8] = b"signed factory deployment";

    pub struct Harness {
        pub bridge: Arc<Bridge>,
        pub store: Arc<InMemoryObjectStore>,
        pub ledger: Arc<InMemoryLedger>,
        pub factory: Address,
    }

    pub fn config() -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_millis(1),
            ..BridgeConfig::default()
        }
    }

    fn deployer(ledger: Arc<InMemoryLedger>, factory: Address) -> Arc<Create2Deployer> {
        Arc::new(Create2Deployer::new(
            ledger,
            DeployerConfig {
                factory_address: factory,
                factory_deployment_tx: FACTORY_TX.to_vec(),
                filesystem_salt: Bytes32::zero(),
                filesystem_init_code: b"filesystem".to_vec(),
                poll_interval: Duration::from_millis(1),
            },
        ))
    }

    /// A bridge over in-memory backends, not yet initialized.
    pub fn uninitialized(config: BridgeConfig) -> Harness {
        let factory = Address::new([0xfa; 20]);
        let ledger = Arc::new(InMemoryLedger::new().with_factory(factory, FACTORY_TX.to_vec()));
        let store = Arc::new(InMemoryObjectStore::new());
        let deployer = deployer(ledger.clone(), factory);
        let bridge = Arc::new(Bridge::new(store.clone(), ledger.clone(), deployer, config));
        Harness {
            bridge,
            store,
            ledger,
            factory,
        }
    }

    /// An uninitialized bridge over `store` and a fresh in-memory ledger.
    pub fn bridge_over(store: Arc<dyn ObjectStore>) -> Arc<Bridge> {
        let factory = Address::new([0xfa; 20]);
        let ledger = Arc::new(InMemoryLedger::new().with_factory(factory, FACTORY_TX.to_vec()));
        let deployer = deployer(ledger.clone(), factory);
        Arc::new(Bridge::new(store, ledger, deployer, config()))
    }

    pub async fn harness_with(config: BridgeConfig) -> Harness {
        let h = uninitialized(config);
        h.bridge.init().await.unwrap();
        h
    }

    pub async fn harness() -> Harness {
        harness_with(config()).await
    }
}
