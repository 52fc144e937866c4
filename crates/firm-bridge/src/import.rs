use serde::Serialize;
use tracing::{debug, info};

use firm_store::CarBundle;
use firm_types::{Address, ContentId};

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::layout::{ipfs_path, normalize_extension, ContractPaths};

/// Where an imported bundle landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub cid: ContentId,
    pub path: String,
}

impl Bridge {
    /// Import a single-root CAR bundle and place its root at
    /// `above/<cid>[.ext]` of `address`'s directory.
    ///
    /// Blocks are imported unpinned. Importing the same bundle twice
    /// returns the same placement without copying again.
    pub async fn import(
        &self,
        address: Address,
        car: &[u8],
        ext: Option<&str>,
    ) -> BridgeResult<ImportResult> {
        let _guard = self.locks.lock(address).await;
        self.require_directory(&address).await?;
        self.import_locked(&ContractPaths::new(&address), car, ext)
            .await
    }

    pub(crate) async fn require_directory(&self, address: &Address) -> BridgeResult<()> {
        match self.get_entry_stat(address).await {
            Some(_) => Ok(()),
            None => Err(BridgeError::InvalidArgument(
                "No directory for this address".into(),
            )),
        }
    }

    pub(crate) async fn import_locked(
        &self,
        paths: &ContractPaths,
        car: &[u8],
        ext: Option<&str>,
    ) -> BridgeResult<ImportResult> {
        let ext = ext.map(normalize_extension).transpose()?;

        let roots = CarBundle::read_roots(car)?;
        if roots.len() != 1 {
            return Err(BridgeError::InvalidArgument(
                "Imported CAR file should have exactly one root".into(),
            ));
        }
        // Rejects bundles whose blocks do not hash to their CIDs.
        CarBundle::from_bytes(car)?;

        let imported = self.store.dag_import(car).await?;
        let cid = match imported.as_slice() {
            [cid] => *cid,
            _ => roots[0],
        };

        let path = paths.above_entry(&cid, ext);
        match self.store.files_stat(&path).await {
            Ok(stat) if stat.cid == cid => {
                debug!(%path, "bundle already placed");
                return Ok(ImportResult { cid, path });
            }
            Ok(stat) => {
                return Err(BridgeError::Conflict(format!(
                    "Entry with the name of {cid} exists but it has a different cid: {}",
                    stat.cid
                )));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.store.files_cp(&ipfs_path(&cid), &path, true).await?;
        info!(%path, "bundle imported");
        Ok(ImportResult { cid, path })
    }
}

#[cfg(test)]
mod tests {
    use firm_store::{dagpb, file_bundle, CarWriter, ObjectStore};

    use super::*;
    use crate::bridge::testing::*;

    #[tokio::test]
    async fn import_places_root_under_above() {
        let h = harness().await;
        let (cid, car) = file_bundle(b"hello").unwrap();

        let result = h.bridge.import(h.factory, &car, Some("txt")).await.unwrap();
        let paths = ContractPaths::new(&h.factory);
        assert_eq!(result.cid, cid);
        assert_eq!(result.path, paths.above_entry(&cid, Some("txt")));
        assert_eq!(h.store.read_file(&result.path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let h = harness().await;
        let (_, car) = file_bundle(b"hello").unwrap();
        let first = h.bridge.import(h.factory, &car, None).await.unwrap();
        let root = h.store.root().await;
        let second = h.bridge.import(h.factory, &car, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.store.root().await, root);
    }

    #[tokio::test]
    async fn import_needs_a_directory() {
        let h = harness().await;
        let (_, car) = file_bundle(b"hello").unwrap();
        let err = h
            .bridge
            .import(Address::new([9; 20]), &car, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref m) if m == "No directory for this address"));
    }

    #[tokio::test]
    async fn multiple_roots_are_rejected() {
        let h = harness().await;
        let a = dagpb::file_node(b"a");
        let b = dagpb::file_node(b"b");
        let mut writer = CarWriter::new(vec![a.cid, b.cid]);
        writer.push(a.cid, a.bytes).push(b.cid, b.bytes);
        let car = writer.finish().unwrap();

        let blocks = h.store.block_count().await;
        let err = h.bridge.import(h.factory, &car, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref m) if m.contains("exactly one root")));
        assert_eq!(h.store.block_count().await, blocks);
    }

    #[tokio::test]
    async fn inlined_identity_blocks_import() {
        let h = harness().await;
        let root = dagpb::file_node(b"with inline leaf");
        // CIDv1, raw codec, identity multihash over "hi"
        let inline = ContentId::from_cid_bytes(&[0x01, 0x55, 0x00, 0x02, b'h', b'i']).unwrap();
        let mut writer = CarWriter::new(vec![root.cid]);
        writer.push(root.cid, root.bytes).push(inline, b"hi".to_vec());
        let car = writer.finish().unwrap();

        let result = h.bridge.import(h.factory, &car, None).await.unwrap();
        assert_eq!(result.cid, root.cid);
    }

    #[tokio::test]
    async fn tampered_bundle_is_rejected() {
        let h = harness().await;
        let (_, mut car) = file_bundle(b"hello").unwrap();
        let last = car.len() - 1;
        car[last] ^= 0xff;
        assert!(matches!(
            h.bridge.import(h.factory, &car, None).await,
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn name_taken_by_other_content_conflicts() {
        let h = harness().await;
        let (cid, car) = file_bundle(b"hello").unwrap();
        let paths = ContractPaths::new(&h.factory);
        h.store
            .files_write(&paths.above_entry(&cid, Some("json")), b"impostor")
            .await
            .unwrap();
        assert!(matches!(
            h.bridge.import(h.factory, &car, Some("json")).await,
            Err(BridgeError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn bad_extension_is_rejected() {
        let h = harness().await;
        let (_, car) = file_bundle(b"hello").unwrap();
        assert!(matches!(
            h.bridge.import(h.factory, &car, Some("a/b")).await,
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
