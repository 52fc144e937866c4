//! Events emitted by the filesystem contract.
//!
//! `SetRoot(address,bytes32)` announces a contract's new root CID and
//! `AbiSignal(bytes32)` announces the interface of a freshly created child.
//! A `bytes32` CID is the sha2-256 digest of a CIDv0 (dag-pb) object.
//!
//! Parameters may be indexed or not; decoding accepts either layout.

use firm_types::{Address, Bytes32, ContentId, Log};

use crate::create2::keccak256;
use crate::error::{LedgerError, LedgerResult};

pub const SET_ROOT_SIGNATURE: &str = "SetRoot(address,bytes32)";
pub const ABI_SIGNAL_SIGNATURE: &str = "AbiSignal(bytes32)";

/// topic0 for an event signature.
pub fn event_topic(signature: &str) -> Bytes32 {
    Bytes32::new(keccak256(signature.as_bytes()))
}

pub fn set_root_topic() -> Bytes32 {
    event_topic(SET_ROOT_SIGNATURE)
}

pub fn abi_signal_topic() -> Bytes32 {
    event_topic(ABI_SIGNAL_SIGNATURE)
}

/// A decoded `SetRoot` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootUpdate {
    pub address: Address,
    pub cid: ContentId,
}

/// Filesystem contract events the bridge reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsEvent {
    SetRoot(RootUpdate),
    AbiSignal(ContentId),
}

impl FsEvent {
    /// Decode a log; `Ok(None)` for events of other signatures.
    pub fn decode(log: &Log) -> LedgerResult<Option<Self>> {
        let Some(topic0) = log.topic0() else {
            return Ok(None);
        };
        if *topic0 == set_root_topic() {
            decode_set_root(log).map(|u| Some(Self::SetRoot(u)))
        } else if *topic0 == abi_signal_topic() {
            decode_abi_signal(log).map(|c| Some(Self::AbiSignal(c)))
        } else {
            Ok(None)
        }
    }
}

fn word(data: &[u8], index: usize) -> LedgerResult<Bytes32> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| {
            LedgerError::InvalidEvent(format!("payload too short: {} bytes", data.len()))
        })
        .and_then(|w| Ok(Bytes32::from_slice(w)?))
}

pub fn decode_set_root(log: &Log) -> LedgerResult<RootUpdate> {
    let (addr_word, cid_word) = match log.topics.as_slice() {
        [_, addr, cid, ..] => (*addr, *cid),
        [_, addr] => (*addr, word(&log.data, 0)?),
        _ => (word(&log.data, 0)?, word(&log.data, 1)?),
    };
    Ok(RootUpdate {
        address: Address::from_word(&addr_word),
        cid: ContentId::from_bytes32(&cid_word)?,
    })
}

pub fn decode_abi_signal(log: &Log) -> LedgerResult<ContentId> {
    let cid_word = match log.topics.as_slice() {
        [_, cid, ..] => *cid,
        _ => word(&log.data, 0)?,
    };
    Ok(ContentId::from_bytes32(&cid_word)?)
}

fn cid_word(cid: &ContentId) -> LedgerResult<Bytes32> {
    cid.to_bytes32()
        .ok_or_else(|| LedgerError::InvalidEvent(format!("{cid} has no bytes32 form")))
}

/// Build a `SetRoot` log with non-indexed parameters.
pub fn set_root_log(emitter: Address, address: Address, cid: &ContentId) -> LedgerResult<Log> {
    let mut data = address.to_word().as_bytes().to_vec();
    data.extend_from_slice(cid_word(cid)?.as_bytes());
    Ok(Log::new(emitter, vec![set_root_topic()], data))
}

/// Build an `AbiSignal` log with a non-indexed parameter.
pub fn abi_signal_log(emitter: Address, cid: &ContentId) -> LedgerResult<Log> {
    let data = cid_word(cid)?.as_bytes().to_vec();
    Ok(Log::new(emitter, vec![abi_signal_topic()], data))
}
