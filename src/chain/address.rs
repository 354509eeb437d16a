//! TRON addresses: `0x41 ‖ keccak256(pubkey)[12..]`, base58check encoded.

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use super::ChainError;

/// Mainnet/testnet address prefix byte
pub const ADDRESS_PREFIX: u8 = 0x41;
const ADDRESS_LEN: usize = 21;

/// Validated TRON address. Always holds the 21-byte form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TronAddress([u8; ADDRESS_LEN]);

impl TronAddress {
    pub fn from_public_key(key: &PublicKey) -> Self {
        let uncompressed = key.serialize_uncompressed();
        let hash = Keccak256::digest(&uncompressed[1..]);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[0] = ADDRESS_PREFIX;
        bytes[1..].copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let bytes: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidAddress(format!("expected {} bytes, got {}", ADDRESS_LEN, bytes.len())))?;
        if bytes[0] != ADDRESS_PREFIX {
            return Err(ChainError::InvalidAddress(format!("bad prefix 0x{:02x}", bytes[0])));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] { &self.0 }
    pub fn to_hex(&self) -> String { hex::encode(self.0) }
    pub fn to_base58(&self) -> String { bitcoin::base58::encode_check(&self.0) }
}

impl FromStr for TronAddress {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.starts_with('T') {
            return Err(ChainError::InvalidAddress(s.to_string()));
        }
        let decoded = bitcoin::base58::decode_check(s)
            .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", s, e)))?;
        Self::from_bytes(&decoded)
    }
}

impl TryFrom<String> for TronAddress {
    type Error = ChainError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<TronAddress> for String {
    fn from(value: TronAddress) -> Self { value.to_base58() }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_base58()) }
}

impl fmt::Debug for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "TronAddress({})", self.to_base58()) }
}
