use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use firm_types::{Address, Bytes32, Log, TransactionReceipt};

use crate::create2::{address_from_calldata, keccak256};
use crate::error::LedgerResult;
use crate::traits::{LedgerClient, LogFilter, TransactionRequest};

const PLACEHOLDER_CODE: &[u8] = &[0x60, 0x00];

/// Scripted result for the next transaction sent to an [`InMemoryLedger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutcome {
    pub applied: bool,
    /// Whether the transaction is ever mined.
    pub mined: bool,
    /// Logs emitted when applied.
    pub logs: Vec<Log>,
}

impl Default for TxOutcome {
    fn default() -> Self {
        Self {
            applied: true,
            mined: true,
            logs: Vec::new(),
        }
    }
}

impl TxOutcome {
    pub fn applied(logs: Vec<Log>) -> Self {
        Self {
            logs,
            ..Self::default()
        }
    }

    pub fn reverted() -> Self {
        Self {
            applied: false,
            ..Self::default()
        }
    }

    /// Never mined; its receipt stays unavailable.
    pub fn pending() -> Self {
        Self {
            mined: false,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct State {
    block: u64,
    code: HashMap<Address, Vec<u8>>,
    receipts: HashMap<Bytes32, TransactionReceipt>,
    logs: Vec<Log>,
    script: VecDeque<TxOutcome>,
    sent: Vec<TransactionRequest>,
    raw_sent: Vec<Vec<u8>>,
    factory: Option<(Address, Vec<u8>)>,
}

impl State {
    fn next_hash(&self, payload: &[u8]) -> Bytes32 {
        let mut buf = ((self.sent.len() + self.raw_sent.len()) as u64)
            .to_be_bytes()
            .to_vec();
        buf.extend_from_slice(payload);
        Bytes32::new(keccak256(&buf))
    }

    fn mine(
        &mut self,
        hash: Bytes32,
        from: Option<Address>,
        to: Option<Address>,
        outcome: TxOutcome,
    ) {
        self.block += 1;
        let block = self.block;
        let logs: Vec<Log> = if outcome.applied {
            outcome
                .logs
                .into_iter()
                .enumerate()
                .map(|(i, mut log)| {
                    log.block_number = Some(block);
                    log.log_index = Some(i as u64);
                    log.transaction_hash = Some(hash);
                    log
                })
                .collect()
        } else {
            Vec::new()
        };
        self.logs.extend(logs.iter().cloned());
        self.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                status: u64::from(outcome.applied),
                block_number: Some(block),
                from,
                to,
                contract_address: None,
                gas_used: 21_000,
                logs,
            },
        );
    }
}

/// In-memory ledger for tests and embedding.
///
/// Transactions are mined immediately, one block each. Outcomes can be
/// scripted with [`script`](Self::script); unscripted transactions apply
/// with no logs. A configured factory deploys `init_code` at the CREATE2
/// address whenever it receives `salt ++ init_code`.
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Emulate a CREATE2 factory at `address`, deployed by `deployment_tx`.
    pub fn with_factory(mut self, address: Address, deployment_tx: Vec<u8>) -> Self {
        self.state.get_mut().factory = Some((address, deployment_tx));
        self
    }

    /// Queue the outcome of the next sent transaction.
    pub async fn script(&self, outcome: TxOutcome) {
        self.state.lock().await.script.push_back(outcome);
    }

    pub async fn set_code(&self, address: Address, code: Vec<u8>) {
        self.state.lock().await.code.insert(address, code);
    }

    /// Record a log in a new block, outside any transaction.
    pub async fn emit_log(&self, mut log: Log) -> u64 {
        let mut state = self.state.lock().await;
        state.block += 1;
        log.block_number = Some(state.block);
        state.logs.push(log);
        state.block
    }

    /// Transactions sent through `send_transaction`, in order.
    pub async fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.state.lock().await.sent.clone()
    }

    /// Every transaction sent, signed or not.
    pub async fn transaction_count(&self) -> usize {
        let state = self.state.lock().await;
        state.sent.len() + state.raw_sent.len()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn send_transaction(&self, tx: &TransactionRequest) -> LedgerResult<Bytes32> {
        let mut state = self.state.lock().await;
        let hash = state.next_hash(&tx.data);
        let outcome = state.script.pop_front().unwrap_or_default();
        state.sent.push(tx.clone());
        if !outcome.mined {
            return Ok(hash);
        }

        if outcome.applied {
            if let Some((factory, _)) = state.factory.clone() {
                let factory_call = tx.to == Some(factory) && state.code.contains_key(&factory);
                if let (true, Ok(child)) = (factory_call, address_from_calldata(&factory, &tx.data)) {
                    let init_code = &tx.data[32..];
                    let code = if init_code.is_empty() {
                        PLACEHOLDER_CODE.to_vec()
                    } else {
                        init_code.to_vec()
                    };
                    state.code.insert(child, code);
                }
            }
        }

        state.mine(hash, tx.from, tx.to, outcome);
        Ok(hash)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> LedgerResult<Bytes32> {
        let mut state = self.state.lock().await;
        let hash = state.next_hash(raw);
        state.raw_sent.push(raw.to_vec());
        if let Some((factory, deployment_tx)) = state.factory.clone() {
            if deployment_tx == raw {
                state.code.insert(factory, PLACEHOLDER_CODE.to_vec());
            }
        }
        state.mine(hash, None, None, TxOutcome::default());
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: &Bytes32,
    ) -> LedgerResult<Option<TransactionReceipt>> {
        Ok(self.state.lock().await.receipts.get(hash).cloned())
    }

    async fn get_code(&self, address: &Address) -> LedgerResult<Vec<u8>> {
        Ok(self
            .state
            .lock()
            .await
            .code
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        Ok(self.state.lock().await.block)
    }

    async fn get_logs(&self, filter: &LogFilter) -> LedgerResult<Vec<Log>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }
}
