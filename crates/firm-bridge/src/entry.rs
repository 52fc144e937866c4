use tracing::{debug, info, warn};

use firm_store::FileStat;
use firm_types::{Address, Bytes32, ContentId};

use crate::bridge::Bridge;
use crate::error::BridgeResult;
use crate::layout::{ipfs_path, ContractPaths};

/// What [`Bridge::update_entry`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryUpdate {
    /// The entry already pointed at the CID.
    Unchanged,
    /// An entry with another CID was removed and replaced.
    Replaced { previous: ContentId },
    /// No entry existed.
    Placed,
}

impl Bridge {
    /// Stat `/.firm/<address>`. Missing entries and store failures both
    /// come back as `None`; failures other than a missing path are logged.
    pub async fn get_entry_stat(&self, address: &Address) -> Option<FileStat> {
        let paths = ContractPaths::new(address);
        match self.store.files_stat(paths.root()).await {
            Ok(stat) => Some(stat),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(%address, error = %e, "entry stat failed");
                None
            }
        }
    }

    /// Alias of [`get_entry_stat`](Self::get_entry_stat).
    pub async fn stat(&self, address: &Address) -> Option<FileStat> {
        self.get_entry_stat(address).await
    }

    /// Make `/.firm/<address>` point at `cid`.
    pub async fn update_entry(&self, address: Address, cid: ContentId) -> BridgeResult<EntryUpdate> {
        let _guard = self.locks.lock(address).await;
        self.update_entry_locked(&address, &cid).await
    }

    /// [`update_entry`](Self::update_entry) for a root as carried on chain.
    pub async fn update_entry_from_word(
        &self,
        address: Address,
        root: &Bytes32,
    ) -> BridgeResult<EntryUpdate> {
        let cid = ContentId::from_bytes32(root)?;
        self.update_entry(address, cid).await
    }

    pub(crate) async fn update_entry_locked(
        &self,
        address: &Address,
        cid: &ContentId,
    ) -> BridgeResult<EntryUpdate> {
        let paths = ContractPaths::new(address);
        let outcome = match self.get_entry_stat(address).await {
            Some(stat) if stat.cid == *cid => {
                debug!(%address, %cid, "entry up to date");
                return Ok(EntryUpdate::Unchanged);
            }
            Some(stat) => {
                self.remove_entry(&paths).await;
                EntryUpdate::Replaced { previous: stat.cid }
            }
            None => EntryUpdate::Placed,
        };
        self.store.files_cp(&ipfs_path(cid), paths.root(), true).await?;
        info!(%address, %cid, ?outcome, "entry updated");
        Ok(outcome)
    }

    async fn remove_entry(&self, paths: &ContractPaths) {
        if let Err(e) = self.store.files_rm(paths.root(), true).await {
            warn!(path = paths.root(), error = %e, "failed removing entry");
        }
    }
}
