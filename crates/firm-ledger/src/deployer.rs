use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use firm_types::{Address, Bytes32};

use crate::create2::{address_from_calldata, create2_address, factory_calldata};
use crate::error::{LedgerError, LedgerResult};
use crate::traits::{LedgerClient, TransactionRequest};

/// Deterministic contract deployment through a factory.
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    fn factory_address(&self) -> Address;

    /// Signed transaction that deploys the factory itself.
    fn factory_deployment_tx(&self) -> &[u8];

    /// Address a factory call with `calldata` deploys to.
    fn det_address(&self, calldata: &[u8]) -> LedgerResult<Address>;

    async fn contract_exists(&self, address: &Address) -> LedgerResult<bool>;

    /// Make sure the factory is deployed.
    async fn init(&self) -> LedgerResult<()>;

    /// Deploy the filesystem contract, or locate it if already deployed.
    async fn deploy_filesystem(&self) -> LedgerResult<Address>;
}

/// Settings for [`Create2Deployer`].
#[derive(Clone, Debug)]
pub struct DeployerConfig {
    pub factory_address: Address,
    pub factory_deployment_tx: Vec<u8>,
    pub filesystem_salt: Bytes32,
    pub filesystem_init_code: Vec<u8>,
    pub poll_interval: Duration,
}

/// [`ContractDeployer`] for a CREATE2 factory taking `salt ++ init_code`.
pub struct Create2Deployer {
    ledger: Arc<dyn LedgerClient>,
    config: DeployerConfig,
}

impl Create2Deployer {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: DeployerConfig) -> Self {
        Self { ledger, config }
    }

    /// Where the filesystem contract lives once deployed.
    pub fn filesystem_address(&self) -> Address {
        create2_address(
            &self.config.factory_address,
            &self.config.filesystem_salt,
            &self.config.filesystem_init_code,
        )
    }
}

#[async_trait]
impl ContractDeployer for Create2Deployer {
    fn factory_address(&self) -> Address {
        self.config.factory_address
    }

    fn factory_deployment_tx(&self) -> &[u8] {
        &self.config.factory_deployment_tx
    }

    fn det_address(&self, calldata: &[u8]) -> LedgerResult<Address> {
        address_from_calldata(&self.config.factory_address, calldata)
    }

    async fn contract_exists(&self, address: &Address) -> LedgerResult<bool> {
        Ok(!self.ledger.get_code(address).await?.is_empty())
    }

    async fn init(&self) -> LedgerResult<()> {
        let factory = self.config.factory_address;
        if self.contract_exists(&factory).await? {
            debug!(%factory, "factory already deployed");
            return Ok(());
        }
        if self.config.factory_deployment_tx.is_empty() {
            return Err(LedgerError::FactoryUnavailable(factory));
        }
        info!(%factory, "deploying factory");
        let hash = self
            .ledger
            .send_raw_transaction(&self.config.factory_deployment_tx)
            .await?;
        self.ledger
            .wait_for_receipt(&hash, self.config.poll_interval)
            .await?;
        if !self.contract_exists(&factory).await? {
            return Err(LedgerError::ContractMissing(factory));
        }
        Ok(())
    }

    async fn deploy_filesystem(&self) -> LedgerResult<Address> {
        let address = self.filesystem_address();
        if self.contract_exists(&address).await? {
            debug!(%address, "filesystem contract already deployed");
            return Ok(address);
        }
        info!(%address, "deploying filesystem contract");
        let calldata = factory_calldata(
            &self.config.filesystem_salt,
            &self.config.filesystem_init_code,
        );
        let tx = TransactionRequest::call(self.config.factory_address, calldata);
        let hash = self.ledger.send_transaction(&tx).await?;
        self.ledger
            .wait_for_receipt(&hash, self.config.poll_interval)
            .await?;
        if !self.contract_exists(&address).await? {
            return Err(LedgerError::ContractMissing(address));
        }
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;

    const FACTORY_TX: &[u8] = b"signed factory deployment";

    fn setup() -> (Arc<InMemoryLedger>, Create2Deployer) {
        let factory = Address::new([0xfa; 20]);
        let ledger = Arc::new(InMemoryLedger::new().with_factory(factory, FACTORY_TX.to_vec()));
        let deployer = Create2Deployer::new(
            ledger.clone(),
            DeployerConfig {
                factory_address: factory,
                factory_deployment_tx: FACTORY_TX.to_vec(),
                filesystem_salt: Bytes32::zero(),
                filesystem_init_code: b"filesystem".to_vec(),
                poll_interval: Duration::from_millis(1),
            },
        );
        (ledger, deployer)
    }

    #[tokio::test]
    async fn init_deploys_missing_factory_once() {
        let (ledger, deployer) = setup();
        assert!(!deployer.contract_exists(&deployer.factory_address()).await.unwrap());
        deployer.init().await.unwrap();
        assert!(deployer.contract_exists(&deployer.factory_address()).await.unwrap());
        let sent = ledger.transaction_count().await;
        deployer.init().await.unwrap();
        assert_eq!(ledger.transaction_count().await, sent);
    }

    #[tokio::test]
    async fn init_without_deployment_tx_fails() {
        let ledger = Arc::new(InMemoryLedger::new());
        let deployer = Create2Deployer::new(
            ledger,
            DeployerConfig {
                factory_address: Address::new([1; 20]),
                factory_deployment_tx: Vec::new(),
                filesystem_salt: Bytes32::zero(),
                filesystem_init_code: Vec::new(),
                poll_interval: Duration::from_millis(1),
            },
        );
        assert!(matches!(
            deployer.init().await,
            Err(LedgerError::FactoryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn filesystem_lands_at_create2_address() {
        let (_ledger, deployer) = setup();
        deployer.init().await.unwrap();
        let address = deployer.deploy_filesystem().await.unwrap();
        assert_eq!(address, deployer.filesystem_address());
        assert!(deployer.contract_exists(&address).await.unwrap());
        // Second call locates the existing deployment.
        assert_eq!(deployer.deploy_filesystem().await.unwrap(), address);
    }

    #[test]
    fn det_address_matches_calldata_layout() {
        let (_ledger, deployer) = setup();
        let data = factory_calldata(&Bytes32::new([7; 32]), b"child");
        assert_eq!(
            deployer.det_address(&data).unwrap(),
            create2_address(&deployer.factory_address(), &Bytes32::new([7; 32]), b"child")
        );
    }
}
