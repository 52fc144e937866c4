use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use firm_types::{Address, Bytes32, Log, TransactionReceipt};

use crate::error::LedgerResult;

/// An unsigned transaction to be signed and sent by the node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Sender; the node's first account when absent.
    pub from: Option<Address>,
    pub to: Option<Address>,
    #[serde(with = "firm_types::bytes::serde_hex")]
    pub data: Vec<u8>,
    pub gas: Option<u64>,
}

impl TransactionRequest {
    pub fn call(to: Address, data: Vec<u8>) -> Self {
        Self {
            to: Some(to),
            data,
            ..Self::default()
        }
    }

    pub fn with_gas(mut self, gas: Option<u64>) -> Self {
        self.gas = gas;
        self
    }
}

/// Log query. `topic0` selects a single event signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topic0: Option<Bytes32>,
    pub from_block: u64,
    /// Inclusive; latest when absent.
    pub to_block: Option<u64>,
}

impl LogFilter {
    /// Whether `log` satisfies the filter.
    pub fn matches(&self, log: &Log) -> bool {
        if self.address.is_some_and(|a| a != log.address) {
            return false;
        }
        if let Some(topic) = &self.topic0 {
            if log.topic0() != Some(topic) {
                return false;
            }
        }
        let block = log.block_number.unwrap_or(0);
        block >= self.from_block && self.to_block.map_or(true, |to| block <= to)
    }
}

/// Access to the ledger node.
///
/// Signing is the node's concern: [`send_transaction`] hands an unsigned
/// request to the node, [`send_raw_transaction`] broadcasts bytes that are
/// already signed.
///
/// [`send_transaction`]: LedgerClient::send_transaction
/// [`send_raw_transaction`]: LedgerClient::send_raw_transaction
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn send_transaction(&self, tx: &TransactionRequest) -> LedgerResult<Bytes32>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> LedgerResult<Bytes32>;

    /// The receipt of a mined transaction; `None` while still pending.
    async fn transaction_receipt(&self, hash: &Bytes32)
        -> LedgerResult<Option<TransactionReceipt>>;

    /// Deployed bytecode; empty when no contract exists.
    async fn get_code(&self, address: &Address) -> LedgerResult<Vec<u8>>;

    async fn block_number(&self) -> LedgerResult<u64>;

    async fn get_logs(&self, filter: &LogFilter) -> LedgerResult<Vec<Log>>;

    /// Poll until the transaction is mined. Callers needing a bound wrap this
    /// in a timeout.
    async fn wait_for_receipt(
        &self,
        hash: &Bytes32,
        poll_interval: Duration,
    ) -> LedgerResult<TransactionReceipt> {
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
