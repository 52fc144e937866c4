use std::sync::Arc;

use async_trait::async_trait;

use firm_store::{export, BlockStat, Blockstore, ObjectStore, StoreResult, UnixFsEntry};
use firm_types::{Address, ContentId};

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::layout::ContractPaths;

/// [`Blockstore`] over the bridge's object store, for the UnixFS exporter.
#[derive(Clone)]
pub struct FirmBlockstore {
    store: Arc<dyn ObjectStore>,
}

impl FirmBlockstore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Blockstore for FirmBlockstore {
    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        self.store.block_get(cid).await
    }
}

fn parse_cid(cid: &str) -> BridgeResult<ContentId> {
    cid.parse()
        .map_err(|e| BridgeError::InvalidArgument(format!("invalid CID {cid:?}: {e}")))
}

impl Bridge {
    /// CID of `/.firm/<address>`.
    pub async fn get_contract_cid(&self, address: &Address) -> BridgeResult<ContentId> {
        self.get_entry_stat(address)
            .await
            .map(|stat| stat.cid)
            .ok_or_else(|| BridgeError::NotFound(format!("no entry for {address}")))
    }

    /// CID of a path inside `address`'s directory, e.g. `below`.
    pub async fn get_sub_path_cid(&self, address: &Address, sub_path: &str) -> BridgeResult<ContentId> {
        let path = ContractPaths::new(address).sub_path(sub_path)?;
        Ok(self.store.files_stat(&path).await?.cid)
    }

    pub async fn get_block(&self, cid: &str) -> BridgeResult<Vec<u8>> {
        let cid = parse_cid(cid)?;
        Ok(self.store.block_get(&cid).await?)
    }

    pub async fn get_block_stat(&self, cid: &str) -> BridgeResult<BlockStat> {
        let cid = parse_cid(cid)?;
        Ok(self.store.block_stat(&cid).await?)
    }

    pub fn blockstore(&self) -> FirmBlockstore {
        FirmBlockstore::new(self.store.clone())
    }

    /// Export the file or directory at `path` below `address`'s entry.
    pub async fn read_entry(&self, address: &Address, path: &str) -> BridgeResult<UnixFsEntry> {
        let root = self.get_contract_cid(address).await?;
        let path = ContractPaths::new(address).sub_path(path)?;
        let relative = path
            .strip_prefix(ContractPaths::new(address).root())
            .unwrap_or_default();
        Ok(export(&self.blockstore(), root, relative).await?)
    }
}
