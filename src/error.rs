//! Crate error and its retry classification

use thiserror::Error;

use crate::amount::{AmountError, Sun};
use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::oracle::OracleError;
use crate::payment::PaymentStatus;
use crate::vault::VaultError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Insufficient balance: {balance} does not cover fees of {required}")]
    InsufficientBalance { balance: Sun, required: Sun },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Price oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("Payment {id} is {status}")]
    Conflict { id: String, status: PaymentStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// How a failure is handled by the scheduler and surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged, payment unchanged, retried next tick
    Transient,
    /// Logged, payment stays pending until funds change or it expires
    PermanentPerPayment,
    /// Attempt fails; never treated as success
    Fatal,
    /// Illegal state change requested by a caller
    Conflict,
    /// Bad request from a caller
    Rejected,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Chain(ChainError::InvalidAddress(_)) => ErrorClass::PermanentPerPayment,
            Error::Chain(ChainError::Mismatch(_)) => ErrorClass::Fatal,
            Error::Chain(_) => ErrorClass::Transient,
            Error::InsufficientBalance { .. } => ErrorClass::PermanentPerPayment,
            Error::Ledger(LedgerError::Duplicate(_)) => ErrorClass::Conflict,
            Error::Ledger(_) | Error::Oracle(_) => ErrorClass::Transient,
            Error::KeyGeneration(_) | Error::Vault(_) | Error::Signing(_) | Error::Config(_) => ErrorClass::Fatal,
            Error::Conflict { .. } => ErrorClass::Conflict,
            Error::NotFound(_) | Error::InvalidInput(_) | Error::Amount(_) => ErrorClass::Rejected,
        }
    }

    pub fn is_transient(&self) -> bool { self.class() == ErrorClass::Transient }
}
