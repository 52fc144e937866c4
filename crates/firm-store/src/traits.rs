use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use firm_types::ContentId;

use crate::error::StoreResult;

/// Kind of a namespace entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Result of a namespace `stat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub cid: ContentId,
    /// File size in bytes; zero for directories.
    pub size: u64,
    pub cumulative_size: u64,
    /// Number of child links.
    pub blocks: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Result of a block `stat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStat {
    pub cid: ContentId,
    pub size: u64,
}

/// Remote content-addressed store with a private mutable namespace.
///
/// Paths are absolute (`/a/b`). A source path for [`files_cp`] may also be an
/// immutable `/ipfs/<cid>[/sub]` path.
///
/// All implementations must satisfy these invariants:
/// - A missing path or block is reported as `StoreError::NotFound`, never as
///   a transport failure.
/// - Each call is independently atomic at best; no call spans a transaction.
/// - Blocks are immutable; importing the same block twice is a no-op.
///
/// [`files_cp`]: ObjectStore::files_cp
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stat a namespace path.
    async fn files_stat(&self, path: &str) -> StoreResult<FileStat>;

    /// Create a directory. With `parents`, missing ancestors are created and
    /// an existing directory is not an error.
    async fn files_mkdir(&self, path: &str, parents: bool) -> StoreResult<()>;

    /// Copy `src` to `dst`. `dst` must not exist.
    async fn files_cp(&self, src: &str, dst: &str, parents: bool) -> StoreResult<()>;

    /// Remove a path. Directories require `recursive`.
    async fn files_rm(&self, path: &str, recursive: bool) -> StoreResult<()>;

    /// Create or truncate a file at `path` with `content`, creating parents.
    async fn files_write(&self, path: &str, content: &[u8]) -> StoreResult<()>;

    /// Import a CAR bundle without pinning. Returns the header roots.
    async fn dag_import(&self, car: &[u8]) -> StoreResult<Vec<ContentId>>;

    /// Fetch raw block bytes.
    async fn block_get(&self, cid: &ContentId) -> StoreResult<Vec<u8>>;

    async fn block_stat(&self, cid: &ContentId) -> StoreResult<BlockStat>;
}
