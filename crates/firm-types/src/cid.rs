use std::fmt;
use std::str::FromStr;

use ipld_core::cid::multihash::Multihash;
use ipld_core::cid::{Cid, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::bytes::Bytes32;
use crate::error::TypeError;

/// Multicodec code for dag-pb (UnixFS) nodes.
pub const DAG_PB: u64 = 0x70;
/// Multicodec code for raw leaf blocks.
pub const RAW: u64 = 0x55;
/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;
/// Multihash code for the identity hash (block inlined in the CID).
pub const IDENTITY: u64 = 0x00;

/// Content identifier for a block or DAG node.
///
/// A `ContentId` is always held in normalized form: any dag-pb/sha2-256 CID
/// is stored as CIDv0, so a CIDv1 and a CIDv0 naming the same content
/// compare equal and render identically (base58btc `Qm...`). CIDs that have
/// no v0 spelling (raw leaves, other hash functions) stay CIDv1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Cid);

impl ContentId {
    /// Wrap a parsed CID, normalizing it to v0 where possible.
    pub fn from_cid(cid: Cid) -> Self {
        Self(normalize(cid))
    }

    /// The CIDv0 for a dag-pb node with the given sha2-256 digest.
    pub fn from_digest(digest: [u8; 32]) -> Result<Self, TypeError> {
        let hash = Multihash::<64>::wrap(SHA2_256, &digest)
            .map_err(|e| TypeError::InvalidCid(e.to_string()))?;
        let cid = Cid::new_v0(hash).map_err(|e| TypeError::InvalidCid(e.to_string()))?;
        Ok(Self(cid))
    }

    /// Decode the fixed on-chain `bytes32` representation (a CIDv0 digest).
    pub fn from_bytes32(word: &Bytes32) -> Result<Self, TypeError> {
        Self::from_digest(*word.as_bytes())
    }

    /// Content id of a dag-pb encoded block.
    pub fn for_dag_pb(block: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(block).into();
        // A 32-byte sha2-256 digest always fits a v0 CID.
        match Self::from_digest(digest) {
            Ok(id) => id,
            Err(_) => unreachable!("sha2-256 digest is a valid CIDv0"),
        }
    }

    /// Content id of a raw leaf block (CIDv1, raw codec).
    pub fn for_raw(block: &[u8]) -> Self {
        let digest = Sha256::digest(block);
        match Multihash::<64>::wrap(SHA2_256, &digest) {
            Ok(hash) => Self(Cid::new_v1(RAW, hash)),
            Err(_) => unreachable!("sha2-256 digest fits a 64-byte multihash"),
        }
    }

    /// Decode a binary CID.
    pub fn from_cid_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let cid = Cid::try_from(bytes).map_err(|e| TypeError::InvalidCid(e.to_string()))?;
        Ok(Self::from_cid(cid))
    }

    /// Read a binary CID from the front of `reader`.
    pub fn read_bytes<R: std::io::Read>(reader: R) -> Result<Self, TypeError> {
        let cid = Cid::read_bytes(reader).map_err(|e| TypeError::InvalidCid(e.to_string()))?;
        Ok(Self::from_cid(cid))
    }

    /// The on-chain `bytes32` form, available for sha2-256 digests only.
    pub fn to_bytes32(&self) -> Option<Bytes32> {
        let hash = self.0.hash();
        if hash.code() != SHA2_256 {
            return None;
        }
        Bytes32::from_slice(hash.digest()).ok()
    }

    /// Check that `block` hashes to this id.
    pub fn verify(&self, block: &[u8]) -> Result<bool, TypeError> {
        let hash = self.0.hash();
        match hash.code() {
            SHA2_256 => Ok(Sha256::digest(block).as_slice() == hash.digest()),
            IDENTITY => Ok(hash.digest() == block),
            other => Err(TypeError::UnsupportedHash(other)),
        }
    }

    pub fn as_cid(&self) -> &Cid {
        &self.0
    }

    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    pub fn is_v0(&self) -> bool {
        self.0.version() == Version::V0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }
}

fn normalize(cid: Cid) -> Cid {
    if cid.version() == Version::V0 {
        return cid;
    }
    let hash = cid.hash();
    if cid.codec() == DAG_PB && hash.code() == SHA2_256 && hash.size() == 32 {
        if let Ok(v0) = Cid::new_v0(*hash) {
            return v0;
        }
    }
    cid
}

impl FromStr for ContentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches("/ipfs/");
        let cid = Cid::try_from(trimmed).map_err(|e| TypeError::InvalidCid(e.to_string()))?;
        Ok(Self::from_cid(cid))
    }
}

impl From<Cid> for ContentId {
    fn from(cid: Cid) -> Self {
        Self::from_cid(cid)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_pb_ids_are_v0() {
        let id = ContentId::for_dag_pb(b"node bytes");
        assert!(id.is_v0());
        assert!(id.to_string().starts_with("Qm"));
        assert_eq!(id.codec(), DAG_PB);
    }

    #[test]
    fn v1_spelling_normalizes_to_v0() {
        let v0 = ContentId::for_dag_pb(b"same content");
        let v1 = v0.as_cid().into_v1().unwrap();
        let parsed: ContentId = v1.to_string().parse().unwrap();
        assert_eq!(parsed, v0);
        assert_eq!(parsed.to_string(), v0.to_string());
    }

    #[test]
    fn raw_leaves_stay_v1() {
        let id = ContentId::for_raw(b"leaf");
        assert!(!id.is_v0());
        assert_eq!(id.codec(), RAW);
        let parsed: ContentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn bytes32_roundtrip() {
        let word = Bytes32::new([0x5a; 32]);
        let id = ContentId::from_bytes32(&word).unwrap();
        assert!(id.is_v0());
        assert_eq!(id.to_bytes32(), Some(word));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentId::for_dag_pb(b"original");
        assert!(id.verify(b"original").unwrap());
        assert!(!id.verify(b"tampered").unwrap());
    }

    #[test]
    fn identity_ids_verify_against_inline_bytes() {
        let hash = Multihash::<64>::wrap(IDENTITY, b"tiny").unwrap();
        let id = ContentId::from_cid(Cid::new_v1(RAW, hash));
        assert!(id.verify(b"tiny").unwrap());
        assert!(!id.verify(b"tine").unwrap());

        let sha512 = Multihash::<64>::wrap(0x13, &[0u8; 64]).unwrap();
        let other = ContentId::from_cid(Cid::new_v1(RAW, sha512));
        assert_eq!(other.verify(b"x"), Err(TypeError::UnsupportedHash(0x13)));
    }

    #[test]
    fn ipfs_path_prefix_is_accepted() {
        let id = ContentId::for_dag_pb(b"x");
        let parsed: ContentId = format!("/ipfs/{id}").parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!("not-a-cid".parse::<ContentId>(), Err(TypeError::InvalidCid(_))));
    }

    #[test]
    fn binary_roundtrip() {
        let id = ContentId::for_dag_pb(b"binary");
        let bytes = id.to_bytes();
        assert_eq!(ContentId::from_cid_bytes(&bytes).unwrap(), id);
        assert_eq!(ContentId::read_bytes(&bytes[..]).unwrap(), id);
    }
}
