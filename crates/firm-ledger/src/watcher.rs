use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use firm_types::Address;

use crate::error::LedgerResult;
use crate::events::{decode_set_root, set_root_topic, RootUpdate};
use crate::traits::{LedgerClient, LogFilter};

/// Polls the ledger for `SetRoot` logs from the filesystem contract and
/// forwards them, in block order, to a bounded channel.
pub struct RootWatcher {
    ledger: Arc<dyn LedgerClient>,
    fs_address: Address,
    poll_interval: Duration,
    next_block: u64,
}

impl RootWatcher {
    pub fn new(ledger: Arc<dyn LedgerClient>, fs_address: Address, poll_interval: Duration) -> Self {
        Self {
            ledger,
            fs_address,
            poll_interval,
            next_block: 0,
        }
    }

    /// Start from `block` instead of genesis.
    pub fn from_block(mut self, block: u64) -> Self {
        self.next_block = block;
        self
    }

    /// Fetch updates from blocks not yet seen. Logs that fail to decode are
    /// skipped.
    pub async fn poll_once(&mut self) -> LedgerResult<Vec<RootUpdate>> {
        let head = self.ledger.block_number().await?;
        if head < self.next_block {
            return Ok(Vec::new());
        }
        let filter = LogFilter {
            address: Some(self.fs_address),
            topic0: Some(set_root_topic()),
            from_block: self.next_block,
            to_block: Some(head),
        };
        let mut logs = self.ledger.get_logs(&filter).await?;
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        self.next_block = head + 1;

        let mut updates = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_set_root(log) {
                Ok(update) => updates.push(update),
                Err(e) => warn!(block = ?log.block_number, error = %e, "skipping malformed SetRoot log"),
            }
        }
        Ok(updates)
    }

    /// Run until the receiving side of `tx` is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<RootUpdate>) {
        info!(fs = %self.fs_address, from = self.next_block, "root watcher started");
        loop {
            match self.poll_once().await {
                Ok(updates) => {
                    for update in updates {
                        debug!(address = %update.address, cid = %update.cid, "root update observed");
                        if tx.send(update).await.is_err() {
                            info!("root update channel closed, watcher stopping");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "polling SetRoot logs failed"),
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub fn spawn(self, tx: mpsc::Sender<RootUpdate>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::set_root_log;
    use crate::memory::InMemoryLedger;
    use firm_types::{Bytes32, ContentId, Log};

    fn fs() -> Address {
        Address::new([0xf5; 20])
    }

    #[tokio::test]
    async fn poll_once_advances_past_seen_blocks() {
        let ledger = Arc::new(InMemoryLedger::new());
        let target = Address::new([0xab; 20]);
        let x = ContentId::for_dag_pb(b"x");
        ledger.emit_log(set_root_log(fs(), target, &x).unwrap()).await;

        let mut watcher = RootWatcher::new(ledger.clone(), fs(), Duration::from_millis(1));
        let first = watcher.poll_once().await.unwrap();
        assert_eq!(first, vec![RootUpdate { address: target, cid: x }]);
        assert!(watcher.poll_once().await.unwrap().is_empty());

        let y = ContentId::for_dag_pb(b"y");
        ledger.emit_log(set_root_log(fs(), target, &y).unwrap()).await;
        assert_eq!(watcher.poll_once().await.unwrap()[0].cid, y);
    }

    #[tokio::test]
    async fn ignores_other_emitters_and_malformed_logs() {
        let ledger = Arc::new(InMemoryLedger::new());
        let cid = ContentId::for_dag_pb(b"x");
        ledger
            .emit_log(set_root_log(Address::zero(), Address::zero(), &cid).unwrap())
            .await;
        ledger
            .emit_log(Log::new(fs(), vec![set_root_topic()], vec![0; 5]))
            .await;
        let mut watcher = RootWatcher::new(ledger, fs(), Duration::from_millis(1));
        assert!(watcher.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_forwards_updates_in_order() {
        let ledger = Arc::new(InMemoryLedger::new());
        let target = Address::new([1; 20]);
        let cids: Vec<ContentId> = (0u8..3)
            .map(|i| ContentId::from_bytes32(&Bytes32::new([i; 32])).unwrap())
            .collect();
        for cid in &cids {
            ledger.emit_log(set_root_log(fs(), target, cid).unwrap()).await;
        }
        let (tx, mut rx) = mpsc::channel(8);
        let handle = RootWatcher::new(ledger, fs(), Duration::from_millis(1)).spawn(tx);
        for cid in &cids {
            assert_eq!(rx.recv().await.unwrap().cid, *cid);
        }
        drop(rx);
        handle.await.unwrap();
    }
}
