use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use firm_types::cid::RAW;
use firm_types::ContentId;

use crate::car::CarBundle;
use crate::dagpb::{self, EncodedNode, PbNode, UnixFsData, UnixFsKind};
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStat, EntryKind, FileStat, ObjectStore};

type Entries = BTreeMap<String, (ContentId, u64)>;

/// In-memory object store with a mutable namespace.
///
/// Intended for tests and embedding. Blocks live in a map keyed by CID and
/// the namespace is a UnixFS directory tree whose root CID is swapped on
/// every mutation, so each call is atomic. Files are stored as a single
/// chunk.
pub struct InMemoryObjectStore {
    inner: RwLock<Inner>,
}

struct Inner {
    blocks: HashMap<ContentId, Vec<u8>>,
    root: ContentId,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        let empty = dagpb::empty_directory();
        let mut blocks = HashMap::new();
        blocks.insert(empty.cid, empty.bytes);
        Self {
            inner: RwLock::new(Inner {
                blocks,
                root: empty.cid,
            }),
        }
    }

    /// Add `content` as a UnixFS file block outside the namespace, as
    /// `ipfs add` would. Returns its CID.
    pub async fn add_file(&self, content: &[u8]) -> ContentId {
        let mut inner = self.inner.write().await;
        inner.put(dagpb::file_node(content)).0
    }

    /// Number of blocks held.
    pub async fn block_count(&self) -> usize {
        self.inner.read().await.blocks.len()
    }

    /// CID of the namespace root.
    pub async fn root(&self) -> ContentId {
        self.inner.read().await.root
    }

    /// Read a namespace file's content.
    pub async fn read_file(&self, path: &str) -> StoreResult<Vec<u8>> {
        let inner = self.inner.read().await;
        let cid = inner.resolve(path)?;
        inner.file_content(&cid)
    }

    /// Names of the entries in a namespace directory.
    pub async fn list(&self, path: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let cid = inner.resolve(path)?;
        Ok(inner.load_dir(&cid)?.into_keys().collect())
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

impl Inner {
    fn put(&mut self, node: EncodedNode) -> (ContentId, u64) {
        self.blocks.entry(node.cid).or_insert(node.bytes);
        (node.cid, node.cumulative_size)
    }

    fn block(&self, cid: &ContentId) -> StoreResult<&[u8]> {
        self.blocks
            .get(cid)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::NotFound(format!("block {cid}")))
    }

    fn decode(&self, cid: &ContentId) -> StoreResult<(PbNode, UnixFsData, u64)> {
        let bytes = self.block(cid)?;
        let corrupt = |e: StoreError| StoreError::CorruptBlock {
            cid: cid.to_string(),
            reason: e.to_string(),
        };
        let node = PbNode::decode(bytes).map_err(corrupt)?;
        let fs = UnixFsData::decode(&node.data).map_err(corrupt)?;
        Ok((node, fs, bytes.len() as u64))
    }

    fn load_dir(&self, cid: &ContentId) -> StoreResult<Entries> {
        if cid.codec() == RAW {
            return Err(StoreError::NotADirectory(cid.to_string()));
        }
        let (node, fs, _) = self.decode(cid)?;
        if fs.kind != UnixFsKind::Directory {
            return Err(StoreError::NotADirectory(cid.to_string()));
        }
        Ok(node
            .links
            .into_iter()
            .map(|l| (l.name, (l.hash, l.tsize)))
            .collect())
    }

    fn stat_cid(&self, cid: &ContentId) -> StoreResult<FileStat> {
        if cid.codec() == RAW {
            let size = self.block(cid)?.len() as u64;
            return Ok(FileStat {
                cid: *cid,
                size,
                cumulative_size: size,
                blocks: 0,
                kind: EntryKind::File,
            });
        }
        let (node, fs, len) = self.decode(cid)?;
        let (kind, size) = match fs.kind {
            UnixFsKind::Directory | UnixFsKind::HamtShard => (EntryKind::Directory, 0),
            _ => (EntryKind::File, fs.file_size()),
        };
        Ok(FileStat {
            cid: *cid,
            size,
            cumulative_size: len + node.links_size(),
            blocks: node.links.len() as u64,
            kind,
        })
    }

    fn file_content(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        if cid.codec() == RAW {
            return Ok(self.block(cid)?.to_vec());
        }
        let (node, fs, _) = self.decode(cid)?;
        match fs.kind {
            UnixFsKind::File | UnixFsKind::Raw => {
                let mut out = fs.data;
                for link in &node.links {
                    out.extend(self.file_content(&link.hash)?);
                }
                Ok(out)
            }
            _ => Err(StoreError::IsDirectory(cid.to_string())),
        }
    }

    fn walk(&self, mut cid: ContentId, comps: &[&str], path: &str) -> StoreResult<ContentId> {
        for name in comps {
            let entries = self.load_dir(&cid)?;
            cid = entries
                .get(*name)
                .map(|(c, _)| *c)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        }
        Ok(cid)
    }

    fn resolve(&self, path: &str) -> StoreResult<ContentId> {
        self.walk(self.root, &components(path), path)
    }

    /// Resolve a copy source: a namespace path or `/ipfs/<cid>[/sub]`.
    fn resolve_source(&self, src: &str) -> StoreResult<ContentId> {
        match components(src).as_slice() {
            ["ipfs", cid, rest @ ..] => {
                let cid: ContentId = cid.parse()?;
                self.block(&cid)?;
                self.walk(cid, rest, src)
            }
            _ => self.resolve(src),
        }
    }

    /// Rebuild every directory from the edited one up to the root.
    fn update_dir<F>(
        &mut self,
        dir: ContentId,
        comps: &[&str],
        parents: bool,
        path: &str,
        edit: F,
    ) -> StoreResult<(ContentId, u64)>
    where
        F: FnOnce(&mut Entries, &str) -> StoreResult<()>,
    {
        let mut entries = self.load_dir(&dir)?;
        match comps {
            [] => return Err(StoreError::AlreadyExists("/".into())),
            [name] => edit(&mut entries, *name)?,
            [name, rest @ ..] => {
                let child = match entries.get(*name) {
                    Some((cid, _)) => *cid,
                    None if parents => self.put(dagpb::empty_directory()).0,
                    None => return Err(StoreError::NotFound(path.to_string())),
                };
                let updated = self.update_dir(child, rest, parents, path, edit)?;
                entries.insert((*name).to_string(), updated);
            }
        }
        Ok(self.put(dagpb::directory_node(&entries)))
    }

    fn mutate<F>(&mut self, path: &str, parents: bool, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Entries, &str) -> StoreResult<()>,
    {
        let comps = components(path);
        let (root, _) = self.update_dir(self.root, &comps, parents, path, edit)?;
        self.root = root;
        Ok(())
    }
}

fn insert_new(
    entry: (ContentId, u64),
    path: &str,
) -> impl FnOnce(&mut Entries, &str) -> StoreResult<()> + '_ {
    move |entries: &mut Entries, name: &str| {
        if entries.contains_key(name) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        entries.insert(name.to_string(), entry);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn files_stat(&self, path: &str) -> StoreResult<FileStat> {
        let inner = self.inner.read().await;
        let cid = inner.resolve(path)?;
        inner.stat_cid(&cid)
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Ok(cid) = inner.resolve(path) {
            let stat = inner.stat_cid(&cid)?;
            return match (parents, stat.kind) {
                (true, EntryKind::Directory) => Ok(()),
                _ => Err(StoreError::AlreadyExists(path.to_string())),
            };
        }
        let empty = inner.put(dagpb::empty_directory());
        inner.mutate(path, parents, insert_new(empty, path))
    }

    async fn files_cp(&self, src: &str, dst: &str, parents: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let cid = inner.resolve_source(src)?;
        let stat = inner.stat_cid(&cid)?;
        inner.mutate(dst, parents, insert_new((cid, stat.cumulative_size), dst))
    }

    async fn files_rm(&self, path: &str, recursive: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let cid = inner.resolve(path)?;
        if !recursive && inner.stat_cid(&cid)?.kind == EntryKind::Directory {
            return Err(StoreError::IsDirectory(path.to_string()));
        }
        inner.mutate(path, false, |entries, name| {
            entries
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        })
    }

    async fn files_write(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Ok(cid) = inner.resolve(path) {
            if inner.stat_cid(&cid)?.kind == EntryKind::Directory {
                return Err(StoreError::IsDirectory(path.to_string()));
            }
        }
        let file = inner.put(dagpb::file_node(content));
        inner.mutate(path, true, |entries, name| {
            entries.insert(name.to_string(), file);
            Ok(())
        })
    }

    async fn dag_import(&self, car: &[u8]) -> StoreResult<Vec<ContentId>> {
        let bundle = CarBundle::from_bytes(car)?;
        let roots = bundle.roots().to_vec();
        let mut inner = self.inner.write().await;
        for (cid, block) in bundle.into_blocks() {
            inner.blocks.entry(cid).or_insert(block);
        }
        Ok(roots)
    }

    async fn block_get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        Ok(self.inner.read().await.block(cid)?.to_vec())
    }

    async fn block_stat(&self, cid: &ContentId) -> StoreResult<BlockStat> {
        let size = self.inner.read().await.block(cid)?.len() as u64;
        Ok(BlockStat { cid: *cid, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::file_bundle;

    #[tokio::test]
    async fn fresh_store_has_empty_root() {
        let store = InMemoryObjectStore::new();
        let stat = store.files_stat("/").await.unwrap();
        assert_eq!(stat.kind, EntryKind::Directory);
        assert_eq!(stat.cid, dagpb::empty_directory().cid);
        assert!(store.files_stat("/missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn mkdir_with_and_without_parents() {
        let store = InMemoryObjectStore::new();
        assert!(store.files_mkdir("/a/b", false).await.unwrap_err().is_not_found());
        store.files_mkdir("/a/b/c", true).await.unwrap();
        store.files_mkdir("/a/b/c", true).await.unwrap();
        assert!(matches!(
            store.files_mkdir("/a/b/c", false).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.list("/a/b").await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn write_then_read_and_overwrite() {
        let store = InMemoryObjectStore::new();
        store.files_write("/x/f.json", b"one").await.unwrap();
        assert_eq!(store.read_file("/x/f.json").await.unwrap(), b"one");
        store.files_write("/x/f.json", b"two!").await.unwrap();
        let stat = store.files_stat("/x/f.json").await.unwrap();
        assert_eq!(stat.size, 4);
        assert_eq!(stat.cid, dagpb::file_node(b"two!").cid);
    }

    #[tokio::test]
    async fn cp_from_ipfs_path_and_reject_existing_target() {
        let store = InMemoryObjectStore::new();
        let cid = store.add_file(b"abi").await;
        store
            .files_cp(&format!("/ipfs/{cid}"), "/c/sc/abi.json", true)
            .await
            .unwrap();
        assert_eq!(store.files_stat("/c/sc/abi.json").await.unwrap().cid, cid);
        assert!(matches!(
            store.files_cp(&format!("/ipfs/{cid}"), "/c/sc/abi.json", true).await,
            Err(StoreError::AlreadyExists(_))
        ));
        let unknown = dagpb::file_node(b"never stored").cid;
        assert!(store
            .files_cp(&format!("/ipfs/{unknown}"), "/c/other", true)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn rm_requires_recursive_for_directories() {
        let store = InMemoryObjectStore::new();
        store.files_mkdir("/d/e", true).await.unwrap();
        assert!(matches!(
            store.files_rm("/d", false).await,
            Err(StoreError::IsDirectory(_))
        ));
        store.files_rm("/d", true).await.unwrap();
        assert!(store.files_stat("/d").await.unwrap_err().is_not_found());
        assert!(store.files_rm("/d", true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn directory_cids_are_content_derived() {
        let a = InMemoryObjectStore::new();
        let b = InMemoryObjectStore::new();
        a.files_write("/p/one", b"1").await.unwrap();
        a.files_write("/p/two", b"2").await.unwrap();
        b.files_write("/p/two", b"2").await.unwrap();
        b.files_write("/p/one", b"1").await.unwrap();
        assert_eq!(
            a.files_stat("/p").await.unwrap().cid,
            b.files_stat("/p").await.unwrap().cid
        );
        assert_eq!(a.root().await, b.root().await);
    }

    #[tokio::test]
    async fn import_and_block_access() {
        let store = InMemoryObjectStore::new();
        let (cid, car) = file_bundle(b"payload").unwrap();
        assert_eq!(store.dag_import(&car).await.unwrap(), vec![cid]);
        let block = store.block_get(&cid).await.unwrap();
        assert_eq!(store.block_stat(&cid).await.unwrap().size, block.len() as u64);
        store
            .files_cp(&format!("/ipfs/{cid}"), "/p/file", true)
            .await
            .unwrap();
        assert_eq!(store.read_file("/p/file").await.unwrap(), b"payload");
    }
}
