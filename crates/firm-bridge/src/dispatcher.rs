use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use firm_ledger::RootUpdate;
use firm_types::{Address, ContentId};

use crate::bridge::Bridge;
use crate::error::BridgeResult;

type WorkerExit = (Address, watch::Receiver<ContentId>);

/// Fans root updates out to one worker per address.
///
/// Each address has a single slot holding its latest CID, so dispatching
/// never waits on a worker and a stalled address cannot hold up the others.
/// Updates for one address are applied in arrival order, skipping any that
/// were superseded while the worker was busy. A worker retires once its
/// slot has nothing new.
pub struct RootDispatcher {
    bridge: Arc<Bridge>,
    workers: HashMap<Address, watch::Sender<ContentId>>,
    tasks: JoinSet<WorkerExit>,
}

impl RootDispatcher {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Consume updates until the channel closes, then wait for workers to
    /// drain.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RootUpdate>) {
        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Some(update) => self.dispatch(update),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.retire(joined);
                }
            }
        }
        while let Some(joined) = self.tasks.join_next().await {
            self.retire(joined);
        }
        debug!("root dispatcher stopped");
    }

    pub fn spawn(self, rx: mpsc::Receiver<RootUpdate>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Number of addresses with a live worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    fn dispatch(&mut self, update: RootUpdate) {
        let RootUpdate { address, cid } = update;
        if let Some(slot) = self.workers.get(&address).filter(|slot| !slot.is_closed()) {
            slot.send_replace(cid);
            return;
        }
        let (slot, rx) = watch::channel(cid);
        self.workers.insert(address, slot);
        self.tasks.spawn(entry_worker(self.bridge.clone(), address, rx));
    }

    fn retire(&mut self, joined: Result<WorkerExit, JoinError>) {
        match joined {
            Ok((address, rx)) if rx.has_changed().unwrap_or(false) => {
                self.tasks.spawn(entry_worker(self.bridge.clone(), address, rx));
            }
            Ok((address, _)) => {
                self.workers.remove(&address);
                debug!(%address, "entry worker retired");
            }
            // The slot is left closed and replaced on the next update.
            Err(e) => warn!(error = %e, "entry worker failed"),
        }
    }
}

async fn entry_worker(
    bridge: Arc<Bridge>,
    address: Address,
    mut rx: watch::Receiver<ContentId>,
) -> WorkerExit {
    loop {
        let cid = *rx.borrow_and_update();
        match bridge.update_entry(address, cid).await {
            Ok(outcome) => debug!(%address, %cid, ?outcome, "entry synced"),
            Err(e) => warn!(%address, %cid, error = %e, "entry sync failed"),
        }
        if !rx.has_changed().unwrap_or(false) {
            return (address, rx);
        }
    }
}

/// Running watcher and dispatcher pair.
pub struct RootSync {
    watcher: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl RootSync {
    /// Start following `SetRoot` events of the filesystem contract.
    pub fn start(bridge: Arc<Bridge>) -> BridgeResult<Self> {
        let watcher = bridge.root_watcher()?;
        let (tx, rx) = mpsc::channel(bridge.config().event_channel_capacity.max(1));
        let dispatcher = RootDispatcher::new(bridge).spawn(rx);
        let watcher = watcher.spawn(tx);
        info!("root sync started");
        Ok(Self { watcher, dispatcher })
    }

    /// Stop watching and let queued updates finish.
    pub async fn shutdown(self) {
        self.watcher.abort();
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "root dispatcher failed");
        }
        info!("root sync stopped");
    }
}
