//! dag-pb node and UnixFS data codec.
//!
//! Only the subset used by the mutable namespace is supported: directories,
//! HAMT shard headers and files (single chunk or chunked with child links). Encoding follows the
//! canonical field order so that locally computed CIDs match the ones a
//! remote store produces for the same content.

use std::collections::BTreeMap;

use firm_types::ContentId;

use crate::error::{StoreError, StoreResult};
use crate::varint::{decode_varint, encode_varint};

const WIRE_VARINT: u64 = 0;
const WIRE_LEN: u64 = 2;

/// A named link from a dag-pb node to a child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbLink {
    pub hash: ContentId,
    pub name: String,
    /// Cumulative size of the linked subtree.
    pub tsize: u64,
}

/// A decoded dag-pb node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PbNode {
    pub links: Vec<PbLink>,
    pub data: Vec<u8>,
}

impl PbNode {
    /// Encode with links before data, as dag-pb requires.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for link in &self.links {
            let mut inner = Vec::new();
            put_bytes(&mut inner, 1, &link.hash.to_bytes());
            put_bytes(&mut inner, 2, link.name.as_bytes());
            put_varint(&mut inner, 3, link.tsize);
            put_bytes(&mut out, 2, &inner);
        }
        put_bytes(&mut out, 1, &self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut node = PbNode::default();
        for field in Fields::new(bytes) {
            match field? {
                (1, Value::Bytes(data)) => node.data = data.to_vec(),
                (2, Value::Bytes(link)) => node.links.push(decode_link(link)?),
                (n, _) => return Err(malformed(format!("unexpected PBNode field {n}"))),
            }
        }
        Ok(node)
    }

    /// Sum of the child subtree sizes.
    pub fn links_size(&self) -> u64 {
        self.links.iter().map(|l| l.tsize).sum()
    }
}

fn decode_link(bytes: &[u8]) -> StoreResult<PbLink> {
    let mut hash = None;
    let mut name = String::new();
    let mut tsize = 0;
    for field in Fields::new(bytes) {
        match field? {
            (1, Value::Bytes(b)) => hash = Some(ContentId::from_cid_bytes(b)?),
            (2, Value::Bytes(b)) => {
                name = String::from_utf8(b.to_vec())
                    .map_err(|_| malformed("link name is not UTF-8"))?;
            }
            (3, Value::Varint(v)) => tsize = v,
            (n, _) => return Err(malformed(format!("unexpected PBLink field {n}"))),
        }
    }
    let hash = hash.ok_or_else(|| malformed("link without hash"))?;
    Ok(PbLink { hash, name, tsize })
}

/// UnixFS node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnixFsKind {
    Raw,
    Directory,
    File,
    Metadata,
    Symlink,
    HamtShard,
}

impl UnixFsKind {
    fn code(self) -> u64 {
        match self {
            Self::Raw => 0,
            Self::Directory => 1,
            Self::File => 2,
            Self::Metadata => 3,
            Self::Symlink => 4,
            Self::HamtShard => 5,
        }
    }

    fn from_code(code: u64) -> StoreResult<Self> {
        Ok(match code {
            0 => Self::Raw,
            1 => Self::Directory,
            2 => Self::File,
            3 => Self::Metadata,
            4 => Self::Symlink,
            5 => Self::HamtShard,
            other => return Err(malformed(format!("unknown UnixFS type {other}"))),
        })
    }
}

/// The UnixFS payload carried in a dag-pb node's data field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixFsData {
    pub kind: UnixFsKind,
    pub data: Vec<u8>,
    pub filesize: Option<u64>,
    pub blocksizes: Vec<u64>,
    /// Multihash code used to place names in a sharded directory.
    pub hash_type: Option<u64>,
    /// Buckets per level of a sharded directory.
    pub fanout: Option<u64>,
}

impl UnixFsData {
    pub fn directory() -> Self {
        Self {
            kind: UnixFsKind::Directory,
            data: Vec::new(),
            filesize: None,
            blocksizes: Vec::new(),
            hash_type: None,
            fanout: None,
        }
    }

    /// Header of a HAMT shard node; `bitfield` marks the occupied buckets.
    pub fn hamt_shard(bitfield: Vec<u8>, hash_type: u64, fanout: u64) -> Self {
        Self {
            kind: UnixFsKind::HamtShard,
            data: bitfield,
            filesize: None,
            blocksizes: Vec::new(),
            hash_type: Some(hash_type),
            fanout: Some(fanout),
        }
    }

    pub fn file(content: &[u8]) -> Self {
        Self {
            kind: UnixFsKind::File,
            data: content.to_vec(),
            filesize: Some(content.len() as u64),
            blocksizes: Vec::new(),
            hash_type: None,
            fanout: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.kind.code());
        if !self.data.is_empty() {
            put_bytes(&mut out, 2, &self.data);
        }
        if let Some(size) = self.filesize {
            put_varint(&mut out, 3, size);
        }
        for size in &self.blocksizes {
            put_varint(&mut out, 4, *size);
        }
        if let Some(code) = self.hash_type {
            put_varint(&mut out, 5, code);
        }
        if let Some(fanout) = self.fanout {
            put_varint(&mut out, 6, fanout);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut kind = None;
        let mut data = Vec::new();
        let mut filesize = None;
        let mut blocksizes = Vec::new();
        let mut hash_type = None;
        let mut fanout = None;
        for field in Fields::new(bytes) {
            match field? {
                (1, Value::Varint(code)) => kind = Some(UnixFsKind::from_code(code)?),
                (2, Value::Bytes(b)) => data = b.to_vec(),
                (3, Value::Varint(v)) => filesize = Some(v),
                (4, Value::Varint(v)) => blocksizes.push(v),
                (5, Value::Varint(v)) => hash_type = Some(v),
                (6, Value::Varint(v)) => fanout = Some(v),
                // mode and mtime are carried but not interpreted
                (7 | 8, _) => {}
                (n, _) => return Err(malformed(format!("unexpected UnixFS field {n}"))),
            }
        }
        let kind = kind.ok_or_else(|| malformed("UnixFS data without type"))?;
        Ok(Self {
            kind,
            data,
            filesize,
            blocksizes,
            hash_type,
            fanout,
        })
    }

    /// Logical file size.
    pub fn file_size(&self) -> u64 {
        self.filesize.unwrap_or(self.data.len() as u64)
    }
}

/// An encoded node together with its CID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedNode {
    pub cid: ContentId,
    pub bytes: Vec<u8>,
    /// Block size plus every linked subtree.
    pub cumulative_size: u64,
}

impl EncodedNode {
    fn from_node(node: &PbNode) -> Self {
        let bytes = node.encode();
        Self {
            cid: ContentId::for_dag_pb(&bytes),
            cumulative_size: bytes.len() as u64 + node.links_size(),
            bytes,
        }
    }
}

/// A single-chunk UnixFS file node for `content`.
pub fn file_node(content: &[u8]) -> EncodedNode {
    EncodedNode::from_node(&PbNode {
        links: Vec::new(),
        data: UnixFsData::file(content).encode(),
    })
}

/// A UnixFS directory node over `entries` (name -> (cid, cumulative size)).
/// Links are emitted in name order.
pub fn directory_node(entries: &BTreeMap<String, (ContentId, u64)>) -> EncodedNode {
    let links = entries
        .iter()
        .map(|(name, (hash, tsize))| PbLink {
            hash: *hash,
            name: name.clone(),
            tsize: *tsize,
        })
        .collect();
    EncodedNode::from_node(&PbNode {
        links,
        data: UnixFsData::directory().encode(),
    })
}

pub fn empty_directory() -> EncodedNode {
    directory_node(&BTreeMap::new())
}

// ---------------------------------------------------------------------------
// Protobuf primitives
// ---------------------------------------------------------------------------

fn put_varint(out: &mut Vec<u8>, field: u64, value: u64) {
    encode_varint(out, (field << 3) | WIRE_VARINT);
    encode_varint(out, value);
}

fn put_bytes(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    encode_varint(out, (field << 3) | WIRE_LEN);
    encode_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

enum Value<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
}

struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn next_field(&mut self) -> StoreResult<(u64, Value<'a>)> {
        let (key, n) = decode_varint(&self.buf[self.pos..])?;
        self.pos += n;
        let value = match key & 0x7 {
            WIRE_VARINT => {
                let (v, n) = decode_varint(&self.buf[self.pos..])?;
                self.pos += n;
                Value::Varint(v)
            }
            WIRE_LEN => {
                let (len, n) = decode_varint(&self.buf[self.pos..])?;
                self.pos += n;
                let end = self
                    .pos
                    .checked_add(len as usize)
                    .filter(|end| *end <= self.buf.len())
                    .ok_or_else(|| malformed("field extends beyond block"))?;
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Value::Bytes(bytes)
            }
            wire => return Err(malformed(format!("unsupported wire type {wire}"))),
        };
        Ok((key >> 3, value))
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = StoreResult<(u64, Value<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let item = self.next_field();
        if item.is_err() {
            self.pos = self.buf.len();
        }
        Some(item)
    }
}

fn malformed(reason: impl Into<String>) -> StoreError {
    StoreError::Serialization(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_matches_well_known_cid() {
        let node = empty_directory();
        assert_eq!(node.bytes, vec![0x0a, 0x02, 0x08, 0x01]);
        assert_eq!(
            node.cid.to_string(),
            "QmUNLLsPACCz1vLxQVkXqqLX5R1X345qqfHbsf67hvA3Nn"
        );
    }

    #[test]
    fn empty_file_matches_well_known_cid() {
        let node = file_node(b"");
        assert_eq!(node.bytes, vec![0x0a, 0x04, 0x08, 0x02, 0x18, 0x00]);
        assert_eq!(
            node.cid.to_string(),
            "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH"
        );
    }

    #[test]
    fn directory_links_are_sorted_and_decodable() {
        let a = file_node(b"a");
        let b = file_node(b"bb");
        let mut entries = BTreeMap::new();
        entries.insert("zeta".to_string(), (b.cid, b.cumulative_size));
        entries.insert("alpha".to_string(), (a.cid, a.cumulative_size));
        let dir = directory_node(&entries);

        let decoded = PbNode::decode(&dir.bytes).unwrap();
        let names: Vec<&str> = decoded.links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(decoded.links[0].hash, a.cid);
        assert_eq!(
            dir.cumulative_size,
            dir.bytes.len() as u64 + a.cumulative_size + b.cumulative_size
        );
        let fs = UnixFsData::decode(&decoded.data).unwrap();
        assert_eq!(fs.kind, UnixFsKind::Directory);
    }

    #[test]
    fn file_payload_roundtrips() {
        let node = file_node(b"hello");
        let pb = PbNode::decode(&node.bytes).unwrap();
        let fs = UnixFsData::decode(&pb.data).unwrap();
        assert_eq!(fs.kind, UnixFsKind::File);
        assert_eq!(fs.data, b"hello");
        assert_eq!(fs.file_size(), 5);
    }

    #[test]
    fn truncated_block_is_rejected() {
        let node = file_node(b"hello");
        assert!(PbNode::decode(&node.bytes[..node.bytes.len() - 2]).is_err());
    }
}
