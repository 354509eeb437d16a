//! Secret Vault - AES-256-GCM encryption of wallet keys at rest.
//!
//! Blob layout (base64, standard alphabet):
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ nonce (12 B) │ ciphertext ‖ GCM tag (16 B)  │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! The nonce is fresh per call. The vault key is process configuration,
//! loaded once; it is zeroized on drop and never printed.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const VAULT_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid vault key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication failed: blob truncated or tampered")]
    Authentication,
}

/// 32-byte symmetric key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; VAULT_KEY_LEN]);

impl VaultKey {
    pub fn from_bytes(bytes: [u8; VAULT_KEY_LEN]) -> Self { Self(bytes) }

    pub fn from_slice(slice: &[u8]) -> Result<Self, VaultError> {
        let bytes: [u8; VAULT_KEY_LEN] = slice
            .try_into()
            .map_err(|_| VaultError::InvalidKeyLength { expected: VAULT_KEY_LEN, got: slice.len() })?;
        Ok(Self(bytes))
    }

    /// Parse a configured key: 64 hex chars, or exactly 32 raw bytes.
    pub fn parse(value: &str) -> Result<Self, VaultError> {
        let value = value.trim();
        if value.len() == VAULT_KEY_LEN * 2 {
            if let Ok(decoded) = hex::decode(value) {
                let decoded = Zeroizing::new(decoded);
                return Self::from_slice(&decoded);
            }
        }
        Self::from_slice(value.as_bytes())
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; VAULT_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String { hex::encode(self.0) }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("VaultKey(<redacted>)") }
}

/// Symmetric vault over a single process-wide key.
pub struct SecretVault {
    cipher: Aes256Gcm,
}

impl SecretVault {
    pub fn new(key: &VaultKey) -> Result<Self, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(&key.0)
            .map_err(|_| VaultError::InvalidKeyLength { expected: VAULT_KEY_LEN, got: key.0.len() })?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|_| VaultError::Encryption)?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(encode_base64(&blob))
    }

    /// Plaintext comes back in a zeroizing buffer; callers keep it no longer
    /// than one signing operation.
    pub fn decrypt(&self, blob: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let data = decode_base64(blob)?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Authentication);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Authentication)
    }
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("SecretVault") }
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// A blob cut or edited mid-symbol is as untrustworthy as a bad tag.
fn decode_base64(value: &str) -> Result<Vec<u8>, VaultError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|_| VaultError::Authentication)
}
