//! Sweep - Move a deposit to the hot wallet
//!
//! ```text
//! create_transfer (node) ─► verify fields + txID ─► decrypt key ─► sign txID
//!                                                        │             │
//!                                                        └─ erased ◄───┘
//!                                                                      │
//!                                           broadcast ◄─ r‖s‖v (65 B) ◄┘
//! ```
//!
//! Signing is synchronous and the plaintext key never crosses an await.

use secp256k1::{ecdsa::RecoverableSignature, Message, PublicKey, Secp256k1, SecretKey};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::amount::Sun;
use crate::chain::{ChainClient, ChainError, TronAddress};
use crate::error::{Error, Result};
use crate::payment::Wallet;
use crate::vault::SecretVault;

pub struct Sweeper {
    chain: Arc<dyn ChainClient>,
    vault: Arc<SecretVault>,
}

impl Sweeper {
    pub fn new(chain: Arc<dyn ChainClient>, vault: Arc<SecretVault>) -> Self { Self { chain, vault } }

    /// Transfer exactly `amount` from `wallet` to `to`; returns the txID.
    pub async fn sweep(&self, wallet: &Wallet, to: &TronAddress, amount: Sun) -> Result<String> {
        if amount.is_zero() {
            return Err(Error::InvalidInput("sweep amount is zero".into()));
        }

        let unsigned = self.chain.create_transfer(&wallet.address, to, amount).await?;
        let digest = unsigned.verify_transfer(&wallet.address, to, amount)?;
        let signature = self.sign(wallet, digest)?;

        let signed = unsigned.into_signed(signature);
        let receipt = self.chain.broadcast(&signed).await?;
        if !receipt.is_success() {
            let code = receipt.code.clone().unwrap_or_else(|| "UNKNOWN".into());
            let message = receipt.decoded_message();
            warn!(tx_id = %signed.tx_id, %code, %message, "broadcast rejected");
            return Err(ChainError::Rejected { code, message }.into());
        }

        info!(tx_id = %signed.tx_id, from = %wallet.address, %to, %amount, "sweep broadcast");
        Ok(signed.tx_id)
    }

    fn sign(&self, wallet: &Wallet, digest: [u8; 32]) -> Result<[u8; 65]> {
        let mut secret = unseal(&self.vault, &wallet.encrypted_key)?;
        let secp = Secp256k1::new();

        let signed = if TronAddress::from_public_key(&PublicKey::from_secret_key(&secp, &secret)) != wallet.address {
            Err(Error::Signing(format!("stored key does not control {}", wallet.address)))
        } else {
            Ok(secp.sign_ecdsa_recoverable(&Message::from_digest(digest), &secret))
        };
        secret.non_secure_erase();

        Ok(encode_signature(&signed?))
    }
}

/// Decrypt a wallet blob into a secret key. Accepts the raw 32-byte key and
/// the older 64-char hex form.
pub fn unseal(vault: &SecretVault, blob: &str) -> Result<SecretKey> {
    let plaintext = vault.decrypt(blob)?;
    let raw: Zeroizing<Vec<u8>> = match plaintext.len() {
        32 => plaintext,
        64 => {
            let text = std::str::from_utf8(&plaintext).map_err(|_| Error::Signing("key blob is not hex".into()))?;
            Zeroizing::new(hex::decode(text.trim()).map_err(|_| Error::Signing("key blob is not hex".into()))?)
        }
        n => return Err(Error::Signing(format!("unexpected key length {}", n))),
    };
    SecretKey::from_slice(&raw).map_err(|e| Error::Signing(e.to_string()))
}

/// `r ‖ s ‖ v` with `v` the raw recovery id (0..=3).
fn encode_signature(signature: &RecoverableSignature) -> [u8; 65] {
    let (recovery_id, compact) = signature.serialize_compact();
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    out
}
