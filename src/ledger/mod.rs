//! Ledger - Durable record of wallets, payments, plans and currencies
//!
//! The engine only depends on this query/update contract. Status changes are
//! compare-and-set on `Pending` and report whether they applied, so two
//! writers (or two engine instances) never both settle a payment.

mod local;

pub use local::{default_ledger_path, LocalLedger};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::amount::Sun;
use crate::payment::{Currency, Payment, PaymentStatus, PendingPayment, Plan, Wallet};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger I/O: {0}")]
    Io(String),

    #[error("Ledger serialization: {0}")]
    Serialization(String),

    /// Unique constraint violated (identity, address or id)
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Referenced record is missing
    #[error("Dangling reference: {0}")]
    Dangling(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Pending payments created at or after `cutoff`, joined with wallet and plan.
    async fn find_pending_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingPayment>, LedgerError>;

    /// Pending payments created before `cutoff`.
    async fn find_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>, LedgerError>;

    async fn mark_completed(
        &self,
        id: &str,
        paid: Sun,
        completed_at: DateTime<Utc>,
        tx_id: &str,
    ) -> Result<bool, LedgerError>;

    async fn mark_expired(&self, id: &str, at: DateTime<Utc>) -> Result<bool, LedgerError>;

    async fn update_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>, LedgerError>;

    async fn find_wallet(&self, id: &str) -> Result<Option<Wallet>, LedgerError>;

    async fn find_wallet_by_identity(&self, identity: &str) -> Result<Option<Wallet>, LedgerError>;

    /// Fails with `Duplicate` when the identity or address already has a wallet.
    async fn create_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError>;

    async fn create_payment(&self, payment: &Payment) -> Result<(), LedgerError>;

    async fn find_plan(&self, id: &str) -> Result<Option<Plan>, LedgerError>;

    async fn find_currency(&self, code: &str) -> Result<Option<Currency>, LedgerError>;
}
