//! UnixFS exporter over an abstract blockstore.
//!
//! The exporter knows nothing about the mutable namespace: it walks a DAG
//! from a root CID using only "CID in, block bytes out". Plain and
//! HAMT-sharded directories are both walked.

use async_trait::async_trait;
use serde::Serialize;

use firm_types::cid::RAW;
use firm_types::ContentId;

use crate::dagpb::{PbNode, UnixFsData, UnixFsKind};
use crate::error::{StoreError, StoreResult};
use crate::hamt::{hash_name, ShardLayout, ShardLink};

/// Source of raw blocks for the exporter.
#[async_trait]
pub trait Blockstore: Send + Sync {
    /// Return the block named by `cid`, or `StoreError::NotFound`.
    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>>;
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub cid: ContentId,
    pub size: u64,
}

/// What a path resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UnixFsEntry {
    Directory {
        cid: ContentId,
        entries: Vec<DirEntry>,
    },
    File {
        cid: ContentId,
        size: u64,
        #[serde(skip)]
        content: Vec<u8>,
    },
    Raw {
        cid: ContentId,
        #[serde(skip)]
        content: Vec<u8>,
    },
}

impl UnixFsEntry {
    pub fn cid(&self) -> &ContentId {
        match self {
            Self::Directory { cid, .. } | Self::File { cid, .. } | Self::Raw { cid, .. } => cid,
        }
    }
}

async fn load<B: Blockstore + ?Sized>(
    bs: &B,
    cid: &ContentId,
) -> StoreResult<(PbNode, UnixFsData)> {
    let bytes = bs.get(cid).await?;
    let corrupt = |e: StoreError| StoreError::CorruptBlock {
        cid: cid.to_string(),
        reason: e.to_string(),
    };
    let node = PbNode::decode(&bytes).map_err(corrupt)?;
    let fs = UnixFsData::decode(&node.data).map_err(corrupt)?;
    Ok((node, fs))
}

/// Resolve `path` below `root` and export what it names.
pub async fn export<B: Blockstore + ?Sized>(
    bs: &B,
    root: ContentId,
    path: &str,
) -> StoreResult<UnixFsEntry> {
    let mut cid = root;
    let mut walked = root.to_string();
    for name in path.split('/').filter(|c| !c.is_empty()) {
        walked.push('/');
        walked.push_str(name);
        if cid.codec() == RAW {
            return Err(StoreError::NotADirectory(walked));
        }
        let (node, fs) = load(bs, &cid).await?;
        let child = match fs.kind {
            UnixFsKind::Directory => node.links.into_iter().find(|l| l.name == name).map(|l| l.hash),
            UnixFsKind::HamtShard => shard_lookup(bs, cid, node, fs, name).await?,
            _ => return Err(StoreError::NotADirectory(walked)),
        };
        cid = child.ok_or_else(|| StoreError::NotFound(walked.clone()))?;
    }

    if cid.codec() == RAW {
        let content = bs.get(&cid).await?;
        return Ok(UnixFsEntry::Raw { cid, content });
    }

    let (node, fs) = load(bs, &cid).await?;
    match fs.kind {
        UnixFsKind::Directory => Ok(UnixFsEntry::Directory {
            cid,
            entries: node
                .links
                .into_iter()
                .map(|l| DirEntry {
                    name: l.name,
                    cid: l.hash,
                    size: l.tsize,
                })
                .collect(),
        }),
        UnixFsKind::HamtShard => Ok(UnixFsEntry::Directory {
            cid,
            entries: shard_entries(bs, cid, node, fs).await?,
        }),
        UnixFsKind::File | UnixFsKind::Raw => {
            let size = fs.file_size();
            let content = read_file(bs, node, fs).await?;
            Ok(UnixFsEntry::File { cid, size, content })
        }
        other => Err(StoreError::CorruptBlock {
            cid: cid.to_string(),
            reason: format!("unsupported UnixFS node {other:?}"),
        }),
    }
}

fn corrupt_shard(cid: &ContentId, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptBlock {
        cid: cid.to_string(),
        reason: reason.into(),
    }
}

/// Find `name` in the sharded directory rooted at `cid`.
async fn shard_lookup<B: Blockstore + ?Sized>(
    bs: &B,
    mut cid: ContentId,
    mut node: PbNode,
    mut fs: UnixFsData,
    name: &str,
) -> StoreResult<Option<ContentId>> {
    let hash = hash_name(name);
    let mut level = 0;
    loop {
        let layout = ShardLayout::from_header(&cid, &fs)?;
        let bucket = layout
            .bucket(hash, level)
            .ok_or_else(|| corrupt_shard(&cid, "shard is deeper than the name hash"))?;
        let label = layout.label(bucket);
        let Some(link) = node.links.iter().find(|l| l.name.starts_with(&label)) else {
            return Ok(None);
        };
        let child = match layout
            .classify(&link.name)
            .map_err(|e| corrupt_shard(&cid, e.to_string()))?
        {
            ShardLink::Entry { name: entry, .. } => return Ok((entry == name).then_some(link.hash)),
            ShardLink::Shard { .. } => link.hash,
        };
        let (child_node, child_fs) = load(bs, &child).await?;
        if child_fs.kind != UnixFsKind::HamtShard {
            return Err(corrupt_shard(&child, "shard bucket links to a non-shard node"));
        }
        cid = child;
        node = child_node;
        fs = child_fs;
        level += 1;
    }
}

/// Every entry of the sharded directory rooted at `cid`, sorted by name.
async fn shard_entries<B: Blockstore + ?Sized>(
    bs: &B,
    cid: ContentId,
    node: PbNode,
    fs: UnixFsData,
) -> StoreResult<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![(cid, node, fs)];
    while let Some((cid, node, fs)) = pending.pop() {
        let layout = ShardLayout::from_header(&cid, &fs)?;
        for link in node.links {
            match layout
                .classify(&link.name)
                .map_err(|e| corrupt_shard(&cid, e.to_string()))?
            {
                ShardLink::Entry { name, .. } => entries.push(DirEntry {
                    name: name.to_string(),
                    cid: link.hash,
                    size: link.tsize,
                }),
                ShardLink::Shard { .. } => {
                    let (child_node, child_fs) = load(bs, &link.hash).await?;
                    if child_fs.kind != UnixFsKind::HamtShard {
                        return Err(corrupt_shard(&link.hash, "shard bucket links to a non-shard node"));
                    }
                    pending.push((link.hash, child_node, child_fs));
                }
            }
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Concatenate a file's inline data and its chunks, depth first.
async fn read_file<B: Blockstore + ?Sized>(
    bs: &B,
    node: PbNode,
    fs: UnixFsData,
) -> StoreResult<Vec<u8>> {
    let mut out = fs.data;
    let mut stack: Vec<ContentId> = node.links.iter().rev().map(|l| l.hash).collect();
    while let Some(cid) = stack.pop() {
        if cid.codec() == RAW {
            out.extend(bs.get(&cid).await?);
            continue;
        }
        let (child, child_fs) = load(bs, &cid).await?;
        out.extend(child_fs.data);
        stack.extend(child.links.iter().rev().map(|l| l.hash));
    }
    Ok(out)
}
