use tracing::{debug, warn};

use firm_store::dagpb;
use firm_types::{Address, ContentId, ContractSeed, DeploymentRecord, Message};

use crate::bridge::Bridge;
use crate::error::BridgeResult;
use crate::layout::{ipfs_path, ContractPaths};

/// Which branches of a contract directory exist after creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryReport {
    pub ensured: Vec<String>,
    /// Branch paths that could not be created, with the reason.
    pub failed: Vec<(String, String)>,
}

impl DirectoryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of placing an object at a namespace path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// The path already held the object.
    Existing,
    Written,
}

impl Bridge {
    /// Create `above/`, `sc/` and `below/in/` for `address`. Existing
    /// branches are left alone, so retrying completes a partial directory.
    pub async fn create_contract_dir(&self, address: Address) -> DirectoryReport {
        let _guard = self.locks.lock(address).await;
        self.create_contract_dir_locked(&ContractPaths::new(&address))
            .await
    }

    pub(crate) async fn create_contract_dir_locked(&self, paths: &ContractPaths) -> DirectoryReport {
        let mut report = DirectoryReport::default();
        for branch in [paths.above(), paths.sc(), paths.below_in()] {
            match self.store.files_mkdir(&branch, true).await {
                Ok(()) => report.ensured.push(branch),
                Err(e) => {
                    warn!(path = %branch, error = %e, "failed creating contract directory branch");
                    report.failed.push((branch, e.to_string()));
                }
            }
        }
        report
    }

    /// Create the directory and seed `sc/` from `seed`.
    pub async fn init_contract_dir(
        &self,
        address: Address,
        seed: ContractSeed,
    ) -> BridgeResult<DirectoryReport> {
        let _guard = self.locks.lock(address).await;
        self.init_contract_dir_locked(&ContractPaths::new(&address), &seed)
            .await
    }

    pub(crate) async fn init_contract_dir_locked(
        &self,
        paths: &ContractPaths,
        seed: &ContractSeed,
    ) -> BridgeResult<DirectoryReport> {
        let report = self.create_contract_dir_locked(paths).await;
        if let Some(abi) = &seed.abi_cid {
            self.place_copy(&ipfs_path(abi), abi, &paths.abi()).await?;
        }
        match &seed.deployment {
            DeploymentRecord::Cid(cid) => {
                self.place_copy(&ipfs_path(cid), cid, &paths.deployment())
                    .await?;
            }
            DeploymentRecord::Inline(message) => {
                self.write_record(&paths.deployment(), message).await?;
            }
        }
        Ok(report)
    }

    /// Copy `src` (whose CID is `cid`) to `dst`. A `dst` already holding
    /// `cid` is kept; one holding anything else is replaced.
    pub(crate) async fn place_copy(
        &self,
        src: &str,
        cid: &ContentId,
        dst: &str,
    ) -> BridgeResult<Placement> {
        match self.store.files_stat(dst).await {
            Ok(stat) if stat.cid == *cid => {
                debug!(path = dst, %cid, "already in place");
                return Ok(Placement::Existing);
            }
            Ok(stat) => {
                debug!(path = dst, old = %stat.cid, new = %cid, "replacing");
                self.store.files_rm(dst, true).await?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.store.files_cp(src, dst, true).await?;
        Ok(Placement::Written)
    }

    /// Write `message` as indented JSON with sorted keys, unless `path`
    /// already holds exactly that file.
    async fn write_record(&self, path: &str, message: &Message) -> BridgeResult<Placement> {
        let content = message.to_pretty_json()?;
        let expected = dagpb::file_node(&content).cid;
        match self.store.files_stat(path).await {
            Ok(stat) if stat.cid == expected => return Ok(Placement::Existing),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.store.files_write(path, &content).await?;
        Ok(Placement::Written)
    }
}
