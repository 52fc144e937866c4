use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::bytes::{serde_hex, Bytes32};

/// A log record emitted while executing a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Contract that emitted the log.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<Bytes32>,
    /// Non-indexed ABI-encoded payload.
    #[serde(with = "serde_hex")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<Bytes32>,
}

impl Log {
    pub fn new(address: Address, topics: Vec<Bytes32>, data: Vec<u8>) -> Self {
        Self {
            address,
            topics,
            data,
            block_number: None,
            log_index: None,
            transaction_hash: None,
        }
    }

    /// The event signature topic, if any.
    pub fn topic0(&self) -> Option<&Bytes32> {
        self.topics.first()
    }
}

/// Outcome of a mined transaction as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: Bytes32,
    /// `1` for success, `0` for a reverted transaction.
    pub status: u64,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// A transaction counts as applied when it did not revert and was
    /// included in a block.
    pub fn is_applied(&self) -> bool {
        self.status == 1 && self.block_number.is_some()
    }

    /// Logs emitted by `address`.
    pub fn logs_from(&self, address: Address) -> impl Iterator<Item = &Log> {
        self.logs.iter().filter(move |log| log.address == address)
    }
}

impl fmt::Display for TransactionReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_number {
            Some(n) => write!(f, "tx {} status={} block={n}", self.transaction_hash, self.status),
            None => write!(f, "tx {} status={} pending", self.transaction_hash, self.status),
        }
    }
}
