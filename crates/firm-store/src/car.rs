//! CARv1 bundles.
//!
//! Layout: a varint-framed dag-cbor header `{roots, version: 1}` followed by
//! varint-framed sections, each a binary CID immediately followed by the
//! block bytes it names.

use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};

use firm_types::ContentId;

use crate::dagpb;
use crate::error::{StoreError, StoreResult};
use crate::varint::{decode_varint, encode_varint};

const CAR_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    roots: Vec<Cid>,
    version: u64,
}

/// A parsed and verified CAR bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarBundle {
    roots: Vec<ContentId>,
    blocks: Vec<(ContentId, Vec<u8>)>,
}

impl CarBundle {
    /// Read only the header, without touching the block sections.
    pub fn read_roots(bytes: &[u8]) -> StoreResult<Vec<ContentId>> {
        let (header, _) = read_header(bytes)?;
        Ok(header.roots.into_iter().map(ContentId::from).collect())
    }

    /// Parse a full bundle, checking every block against its CID.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let (header, mut pos) = read_header(bytes)?;
        let mut blocks = Vec::new();
        while pos < bytes.len() {
            let (len, n) = decode_varint(&bytes[pos..])?;
            pos += n;
            let end = pos
                .checked_add(len as usize)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| invalid("section extends beyond bundle"))?;
            let section = &bytes[pos..end];
            let mut cursor = section;
            let cid = ContentId::read_bytes(&mut cursor)
                .map_err(|e| invalid(format!("bad section CID: {e}")))?;
            let block = cursor.to_vec();
            match cid.verify(&block) {
                Ok(true) => {}
                Ok(false) => return Err(invalid(format!("block does not match its CID {cid}"))),
                Err(e) => return Err(invalid(format!("cannot verify block {cid}: {e}"))),
            }
            blocks.push((cid, block));
            pos = end;
        }
        Ok(Self {
            roots: header.roots.into_iter().map(ContentId::from).collect(),
            blocks,
        })
    }

    pub fn roots(&self) -> &[ContentId] {
        &self.roots
    }

    pub fn blocks(&self) -> &[(ContentId, Vec<u8>)] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<(ContentId, Vec<u8>)> {
        self.blocks
    }

    pub fn get(&self, cid: &ContentId) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|(id, _)| id == cid)
            .map(|(_, b)| b.as_slice())
    }
}

fn read_header(bytes: &[u8]) -> StoreResult<(CarHeader, usize)> {
    let (len, n) = decode_varint(bytes).map_err(|e| invalid(e.to_string()))?;
    let end = n
        .checked_add(len as usize)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| invalid("header extends beyond bundle"))?;
    let header: CarHeader = serde_ipld_dagcbor::from_slice(&bytes[n..end])
        .map_err(|e| invalid(format!("bad header: {e}")))?;
    if header.version != CAR_VERSION {
        return Err(invalid(format!("unsupported CAR version {}", header.version)));
    }
    Ok((header, end))
}

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::InvalidBundle(reason.into())
}

/// Incremental CARv1 encoder.
#[derive(Debug, Default)]
pub struct CarWriter {
    roots: Vec<ContentId>,
    blocks: Vec<(ContentId, Vec<u8>)>,
}

impl CarWriter {
    pub fn new(roots: Vec<ContentId>) -> Self {
        Self {
            roots,
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, cid: ContentId, block: Vec<u8>) -> &mut Self {
        self.blocks.push((cid, block));
        self
    }

    pub fn finish(self) -> StoreResult<Vec<u8>> {
        let header = CarHeader {
            roots: self.roots.iter().map(|r| *r.as_cid()).collect(),
            version: CAR_VERSION,
        };
        let header_bytes = serde_ipld_dagcbor::to_vec(&header)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut out = Vec::new();
        encode_varint(&mut out, header_bytes.len() as u64);
        out.extend_from_slice(&header_bytes);
        for (cid, block) in &self.blocks {
            let cid_bytes = cid.to_bytes();
            encode_varint(&mut out, (cid_bytes.len() + block.len()) as u64);
            out.extend_from_slice(&cid_bytes);
            out.extend_from_slice(block);
        }
        Ok(out)
    }
}

/// Pack `content` as a single-chunk UnixFS file in a one-root bundle.
/// Returns the file's CID and the bundle bytes.
pub fn file_bundle(content: &[u8]) -> StoreResult<(ContentId, Vec<u8>)> {
    let node = dagpb::file_node(content);
    let mut writer = CarWriter::new(vec![node.cid]);
    writer.push(node.cid, node.bytes);
    Ok((node.cid, writer.finish()?))
}
