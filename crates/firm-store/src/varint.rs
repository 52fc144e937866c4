//! Unsigned LEB128 varints, shared by the protobuf and CAR codecs.

use crate::error::{StoreError, StoreResult};

pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> StoreResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(StoreError::Serialization("varint overflow".into()));
        }
    }
    Err(StoreError::Serialization("truncated varint".into()))
}
