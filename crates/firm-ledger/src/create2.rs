//! Deterministic (CREATE2) contract addresses.
//!
//! Call data sent to the deployment factory is `salt(32) ++ init_code`; the
//! factory deploys `init_code` at
//! `keccak256(0xff ++ factory ++ salt ++ keccak256(init_code))[12..]`.

use sha3::{Digest, Keccak256};

use firm_types::{Address, Bytes32};

use crate::error::{LedgerError, LedgerResult};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Address a factory deploys `init_code` to under `salt`.
pub fn create2_address(factory: &Address, salt: &Bytes32, init_code: &[u8]) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(factory.as_bytes());
    buf.extend_from_slice(salt.as_bytes());
    buf.extend_from_slice(&keccak256(init_code));
    let hash = keccak256(&buf);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address::new(addr)
}

/// Factory call data for deploying `init_code` under `salt`.
pub fn factory_calldata(salt: &Bytes32, init_code: &[u8]) -> Vec<u8> {
    let mut data = salt.as_bytes().to_vec();
    data.extend_from_slice(init_code);
    data
}

/// Split factory call data into salt and init code.
pub fn split_calldata(data: &[u8]) -> LedgerResult<(Bytes32, &[u8])> {
    if data.len() < 32 {
        return Err(LedgerError::InvalidCallData(data.len()));
    }
    let salt = Bytes32::from_slice(&data[..32])?;
    Ok((salt, &data[32..]))
}

/// Address the factory at `factory` deploys to for `calldata`.
pub fn address_from_calldata(factory: &Address, calldata: &[u8]) -> LedgerResult<Address> {
    let (salt, init_code) = split_calldata(calldata)?;
    Ok(create2_address(factory, &salt, init_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    // EIP-1014 example 0.
    #[test]
    fn eip1014_zero_vector() {
        let addr = create2_address(&Address::zero(), &Bytes32::zero(), &[0x00]);
        assert_eq!(addr.to_string(), "0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38");
    }

    // EIP-1014 example 1.
    #[test]
    fn eip1014_deadbeef_vector() {
        let factory: Address = "0xdeadbeef00000000000000000000000000000000".parse().unwrap();
        let addr = create2_address(&factory, &Bytes32::zero(), &[0x00]);
        assert_eq!(addr.to_string(), "0xb928f69bb1d91cd65274e3c79d8986362984fda3");
    }

    #[test]
    fn calldata_roundtrip() {
        let salt = Bytes32::new([3; 32]);
        let data = factory_calldata(&salt, b"code");
        let (s, code) = split_calldata(&data).unwrap();
        assert_eq!(s, salt);
        assert_eq!(code, b"code");
        let factory = Address::new([5; 20]);
        assert_eq!(
            address_from_calldata(&factory, &data).unwrap(),
            create2_address(&factory, &salt, b"code")
        );
    }

    #[test]
    fn short_calldata_is_rejected() {
        assert!(matches!(
            split_calldata(&[0u8; 31]),
            Err(LedgerError::InvalidCallData(31))
        ));
    }
}
