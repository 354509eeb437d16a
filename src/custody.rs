//! Custody - One deposit wallet per identity
//!
//! ```text
//! provision(identity)
//!     │
//!     ├── wallet exists? ──────────────────────────► return it unchanged
//!     │
//!     ├── OsRng → secp256k1 secret → TRON address
//!     ├── vault.encrypt(secret)            (plaintext never stored)
//!     └── ledger.create_wallet
//!             └── Duplicate (lost a race) ──► re-read, return the winner
//! ```

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::chain::TronAddress;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerError};
use crate::payment::Wallet;
use crate::vault::SecretVault;

const KEYGEN_ATTEMPTS: usize = 8;

pub struct WalletCustody {
    ledger: Arc<dyn Ledger>,
    vault: Arc<SecretVault>,
    clock: Arc<dyn Clock>,
}

impl WalletCustody {
    pub fn new(ledger: Arc<dyn Ledger>, vault: Arc<SecretVault>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, vault, clock }
    }

    /// Wallet for `identity`, creating it on first use.
    pub async fn provision(&self, identity: &str) -> Result<Wallet> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(Error::InvalidInput("identity is empty".into()));
        }

        if let Some(wallet) = self.ledger.find_wallet_by_identity(identity).await? {
            return Ok(wallet);
        }

        let (address, encrypted_key) = self.generate()?;
        let wallet = Wallet {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            address,
            encrypted_key,
            created_at: self.clock.now(),
        };

        match self.ledger.create_wallet(&wallet).await {
            Ok(()) => {
                info!(wallet_id = %wallet.id, %address, "wallet provisioned");
                Ok(wallet)
            }
            Err(LedgerError::Duplicate(reason)) => {
                warn!(%identity, %reason, "wallet created concurrently, using existing");
                self.ledger
                    .find_wallet_by_identity(identity)
                    .await?
                    .ok_or(Error::Ledger(LedgerError::Duplicate(reason)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fresh key pair; returns the address and the vault blob of the secret.
    fn generate(&self) -> Result<(TronAddress, String)> {
        let mut secret = generate_secret_key()?;
        let secp = Secp256k1::signing_only();
        let address = TronAddress::from_public_key(&PublicKey::from_secret_key(&secp, &secret));

        let raw = Zeroizing::new(secret.secret_bytes());
        secret.non_secure_erase();
        let blob = self.vault.encrypt(raw.as_slice())?;
        Ok((address, blob))
    }
}

fn generate_secret_key() -> Result<SecretKey> {
    use rand::RngCore;
    let mut bytes = Zeroizing::new([0u8; 32]);
    for _ in 0..KEYGEN_ATTEMPTS {
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        // zero or >= curve order: draw again
        if let Ok(secret) = SecretKey::from_slice(&bytes[..]) {
            return Ok(secret);
        }
    }
    Err(Error::KeyGeneration("no valid scalar drawn".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::ledger::LocalLedger;
    use crate::vault::VaultKey;

    fn custody(ledger: Arc<LocalLedger>) -> (WalletCustody, Arc<SecretVault>) {
        let vault = Arc::new(SecretVault::new(&VaultKey::from_bytes([3u8; 32])).unwrap());
        (WalletCustody::new(ledger, vault.clone(), Arc::new(SystemClock)), vault)
    }

    #[test]
    fn provision_is_idempotent() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = Arc::new(LocalLedger::in_memory());
            let (custody, _) = custody(ledger.clone());

            let first = custody.provision("a@example.com").await.unwrap();
            let again = custody.provision(" a@example.com ").await.unwrap();
            assert_eq!(first, again);

            let other = custody.provision("b@example.com").await.unwrap();
            assert_ne!(first.address, other.address);
        });
    }

    #[test]
    fn stored_blob_decrypts_to_address_key() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (custody, vault) = custody(Arc::new(LocalLedger::in_memory()));
            let wallet = custody.provision("a@example.com").await.unwrap();

            let raw = vault.decrypt(&wallet.encrypted_key).unwrap();
            assert_eq!(raw.len(), 32);
            let secret = SecretKey::from_slice(&raw).unwrap();
            let secp = Secp256k1::new();
            assert_eq!(TronAddress::from_public_key(&PublicKey::from_secret_key(&secp, &secret)), wallet.address);
            assert!(!wallet.encrypted_key.contains(&hex::encode(raw.as_slice())));
        });
    }

    #[test]
    fn empty_identity_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (custody, _) = custody(Arc::new(LocalLedger::in_memory()));
        assert!(matches!(rt.block_on(custody.provision("  ")), Err(Error::InvalidInput(_))));
    }
}
