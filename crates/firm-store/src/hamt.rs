//! Addressing inside HAMT-sharded UnixFS directories.
//!
//! A shard node has one link per occupied bucket. The link name starts with
//! the bucket index in uppercase hex, padded to the width of `fanout - 1`.
//! A name of exactly that width points at a child shard; a longer name is a
//! directory entry whose name follows the prefix. Entry names are placed by
//! the murmur3-x64-64 hash of the name, consumed most significant bit first,
//! `log2(fanout)` bits per level.

use std::io::Cursor;

use firm_types::ContentId;

use crate::dagpb::UnixFsData;
use crate::error::{StoreError, StoreResult};

/// Multihash code for murmur3-x64-64.
pub const MURMUR3_X64_64: u64 = 0x22;

/// Largest fanout accepted when reading a shard.
const MAX_FANOUT: u64 = 1 << 16;

/// Layout parameters of one shard node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardLayout {
    fanout: u64,
    bits: u32,
    width: usize,
}

impl ShardLayout {
    pub fn new(fanout: u64) -> StoreResult<Self> {
        if fanout < 2 || fanout > MAX_FANOUT || !fanout.is_power_of_two() {
            return Err(StoreError::Serialization(format!(
                "invalid shard fanout {fanout}"
            )));
        }
        Ok(Self {
            fanout,
            bits: fanout.trailing_zeros(),
            width: format!("{:X}", fanout - 1).len(),
        })
    }

    /// Read the layout from a shard node's UnixFS header.
    pub fn from_header(cid: &ContentId, fs: &UnixFsData) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::CorruptBlock {
            cid: cid.to_string(),
            reason,
        };
        match fs.hash_type {
            Some(MURMUR3_X64_64) => {}
            other => return Err(corrupt(format!("unsupported shard hash {other:?}"))),
        }
        let fanout = fs
            .fanout
            .ok_or_else(|| corrupt("shard without fanout".to_string()))?;
        Self::new(fanout).map_err(|e| corrupt(e.to_string()))
    }

    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    /// Link-name prefix of bucket `index`.
    pub fn label(&self, index: usize) -> String {
        format!("{index:0width$X}", width = self.width)
    }

    /// Bucket of `hash` at shard depth `level` (the root shard is level 0).
    pub fn bucket(&self, hash: u64, level: u32) -> Option<usize> {
        let consumed = level.checked_mul(self.bits)?;
        if consumed + self.bits > 64 {
            return None;
        }
        Some(((hash << consumed) >> (64 - self.bits)) as usize)
    }

    /// Classify a link of a shard node.
    pub fn classify<'a>(&self, link_name: &'a str) -> StoreResult<ShardLink<'a>> {
        if link_name.len() < self.width || !link_name.is_char_boundary(self.width) {
            return Err(StoreError::Serialization(format!(
                "shard link name {link_name:?} is shorter than its bucket prefix"
            )));
        }
        let (label, rest) = link_name.split_at(self.width);
        Ok(if rest.is_empty() {
            ShardLink::Shard { label }
        } else {
            ShardLink::Entry { label, name: rest }
        })
    }
}

/// A link of a shard node, split into bucket label and entry name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardLink<'a> {
    Shard { label: &'a str },
    Entry { label: &'a str, name: &'a str },
}

/// The murmur3-x64-64 hash of a directory entry name.
pub fn hash_name(name: &str) -> u64 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_x64_128(&mut Cursor::new(name.as_bytes()), 0).unwrap_or(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_width_follows_fanout() {
        assert_eq!(ShardLayout::new(256).unwrap().label(10), "0A");
        assert_eq!(ShardLayout::new(16).unwrap().label(15), "F");
        assert_eq!(ShardLayout::new(4096).unwrap().label(1), "001");
        assert!(ShardLayout::new(100).is_err());
        assert!(ShardLayout::new(1).is_err());
    }

    #[test]
    fn buckets_consume_high_bits_first() {
        let layout = ShardLayout::new(256).unwrap();
        let hash = 0xAB_CD_00_00_00_00_00_12;
        assert_eq!(layout.bucket(hash, 0), Some(0xAB));
        assert_eq!(layout.bucket(hash, 1), Some(0xCD));
        assert_eq!(layout.bucket(hash, 7), Some(0x12));
        assert_eq!(layout.bucket(hash, 8), None);

        let narrow = ShardLayout::new(4).unwrap();
        assert_eq!(narrow.bucket(0b1101 << 60, 0), Some(0b11));
        assert_eq!(narrow.bucket(0b1101 << 60, 1), Some(0b01));
    }

    #[test]
    fn links_split_into_label_and_name() {
        let layout = ShardLayout::new(256).unwrap();
        assert_eq!(layout.classify("3F").unwrap(), ShardLink::Shard { label: "3F" });
        assert_eq!(
            layout.classify("3Fabi.json").unwrap(),
            ShardLink::Entry { label: "3F", name: "abi.json" }
        );
        assert!(layout.classify("3").is_err());
    }

    #[test]
    fn header_must_name_murmur_and_fanout() {
        let cid = ContentId::for_dag_pb(b"shard");
        let header = UnixFsData::hamt_shard(vec![0; 32], MURMUR3_X64_64, 256);
        assert_eq!(ShardLayout::from_header(&cid, &header).unwrap().fanout(), 256);

        let sha = UnixFsData::hamt_shard(vec![0; 32], 0x12, 256);
        assert!(matches!(
            ShardLayout::from_header(&cid, &sha),
            Err(StoreError::CorruptBlock { .. })
        ));
    }

    #[test]
    fn header_survives_encoding() {
        let header = UnixFsData::hamt_shard(vec![0x80], MURMUR3_X64_64, 8);
        assert_eq!(UnixFsData::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn name_hash_is_stable() {
        assert_eq!(hash_name("abi.json"), hash_name("abi.json"));
        assert_ne!(hash_name("abi.json"), hash_name("deployment.json"));
    }
}
