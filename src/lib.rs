//! Paynode: custodial deposit wallets for a TRX payment gateway.
//!
//! Each purchase gets its own receiving address. The engine polls the chain,
//! classifies what arrived, sweeps sufficient deposits to the operator's hot
//! wallet net of fees, and only then marks the payment settled.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (interval, single-flight)
//!   │
//!   └── Reconciler (one pass)
//!         ├── Ledger            pending payments, compare-and-set updates
//!         ├── ChainReader       balance, bandwidth      ──► ChainClient
//!         ├── classify          underpaid / complete / overpaid
//!         ├── FeeEstimator      balance - fees - buffer
//!         ├── Sweeper           build, verify, sign, broadcast
//!         │     └── SecretVault AES-256-GCM key blobs
//!         └── Notifier          completion / under- / overpayment
//!
//! PaymentService
//!   ├── PriceOracle             USD → sun, locked at creation
//!   └── WalletCustody           one key pair per identity
//! ```
//!
//! # Payment lifecycle
//!
//! | From    | To        | Trigger                                   |
//! |---------|-----------|-------------------------------------------|
//! | Pending | Completed | sweep broadcast accepted                  |
//! | Pending | Cancelled | `PaymentService::cancel_payment`          |
//! | Pending | Expired   | older than the payment window at a tick   |
//!
//! # Features
//!
//! - `http` (default) - TronGrid client, HTTP price ticker, `paynode` binary
//!
//! # Usage
//!
//! ```ignore
//! use paynode::{EngineConfig, EngineContext, install_signal_handlers};
//!
//! let ctx = EngineContext::from_config(EngineConfig::from_env()?)?;
//! let receipt = ctx.payment_service().create_payment("a@example.com", "monthly", None).await?;
//!
//! let shutdown = install_signal_handlers();
//! ctx.scheduler()?.spawn(shutdown.subscribe()).await?;
//! ```

pub mod amount;
pub mod chain;
pub mod classify;
pub mod clock;
pub mod config;
pub mod context;
pub mod custody;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod oracle;
pub mod payment;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod sweep;
pub mod vault;

// =============================================================================
// Re-exports
// =============================================================================
pub use amount::{Sun, SUN_PER_TRX};
pub use chain::{ChainClient, ChainError, ChainReader, Network, TronAddress};
pub use classify::{classify, Classification, Thresholds};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, SchedulerConfig};
pub use context::EngineContext;
pub use custody::WalletCustody;
pub use error::{Error, ErrorClass, Result};
pub use fees::{compute_transferable, FeeEstimator, FeeSchedule};
pub use ledger::{Ledger, LedgerError, LocalLedger};
pub use notify::{LogNotifier, Notifier};
pub use oracle::{native_amount, OracleError, PriceOracle, StaticPriceOracle};
pub use payment::{Currency, Payment, PaymentStatus, PendingPayment, Plan, Wallet};
pub use runtime::{install_signal_handlers, Shutdown};
pub use scheduler::{PassReport, Reconciler, Scheduler, TickAction, TickOutcome};
pub use service::{PaymentReceipt, PaymentService, PaymentView};
pub use sweep::Sweeper;
pub use vault::{SecretVault, VaultError, VaultKey};

#[cfg(feature = "http")]
pub use chain::TronGridClient;
#[cfg(feature = "http")]
pub use oracle::HttpPriceOracle;
