//! Engine Context - Every collaborator, built once and shared
//!
//! ```text
//!                      EngineContext
//!   ┌──────────┬─────────┬──────────┬──────────┬──────────┬────────┐
//!   │ ledger   │ chain   │ vault    │ notifier │ oracle   │ clock  │
//!   └────┬─────┴────┬────┴────┬─────┴────┬─────┴────┬─────┴───┬────┘
//!        │          │         │          │          │         │
//!        ▼          ▼         ▼          ▼          ▼         ▼
//!   PaymentService (custody + oracle)     Reconciler (reader, fees, sweeper)
//! ```

use std::sync::Arc;

use crate::chain::{ChainClient, ChainReader, TronAddress};
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::custody::WalletCustody;
use crate::fees::FeeEstimator;
use crate::ledger::Ledger;
use crate::notify::Notifier;
use crate::oracle::PriceOracle;
use crate::scheduler::{Reconciler, Scheduler};
use crate::service::PaymentService;
use crate::sweep::Sweeper;
use crate::vault::SecretVault;

#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub ledger: Arc<dyn Ledger>,
    pub chain: Arc<dyn ChainClient>,
    pub vault: Arc<SecretVault>,
    pub notifier: Arc<dyn Notifier>,
    pub oracle: Arc<dyn PriceOracle>,
    pub clock: Arc<dyn Clock>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn Ledger>,
        chain: Arc<dyn ChainClient>,
        vault: Arc<SecretVault>,
        notifier: Arc<dyn Notifier>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config: Arc::new(config), ledger, chain, vault, notifier, oracle, clock }
    }

    pub fn reader(&self) -> ChainReader { ChainReader::new(self.chain.clone()) }

    pub fn fees(&self) -> FeeEstimator { FeeEstimator::new(self.reader(), self.config.fees) }

    pub fn sweeper(&self) -> Sweeper { Sweeper::new(self.chain.clone(), self.vault.clone()) }

    pub fn custody(&self) -> WalletCustody {
        WalletCustody::new(self.ledger.clone(), self.vault.clone(), self.clock.clone())
    }

    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(
            self.ledger.clone(),
            self.custody(),
            self.oracle.clone(),
            self.clock.clone(),
            self.config.scheduler.payment_window,
        )
    }

    pub fn reconciler(&self) -> Result<Reconciler, ConfigError> {
        let hot_wallet: TronAddress = self.config.hot_wallet.ok_or(ConfigError::Missing("PAYNODE_HOT_WALLET"))?;
        Ok(Reconciler::new(
            self.ledger.clone(),
            self.reader(),
            self.fees(),
            self.sweeper(),
            self.notifier.clone(),
            self.clock.clone(),
            hot_wallet,
            self.config.thresholds,
            self.config.scheduler.payment_window,
        ))
    }

    pub fn scheduler(&self) -> Result<Scheduler<Reconciler>, ConfigError> {
        Ok(Scheduler::new(Arc::new(self.reconciler()?), self.config.scheduler.interval))
    }
}

#[cfg(feature = "http")]
mod live {
    use super::*;
    use crate::chain::TronGridClient;
    use crate::clock::SystemClock;
    use crate::ledger::LocalLedger;
    use crate::notify::LogNotifier;
    use crate::oracle::HttpPriceOracle;
    use anyhow::Context;

    impl EngineContext {
        /// Production wiring: TronGrid, HTTP ticker, on-disk ledger, log notices.
        pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
            config.validate()?;
            let vault_key = config.vault_key.as_ref().context("vault key")?;
            let vault = Arc::new(SecretVault::new(vault_key)?);
            let chain = TronGridClient::with_timeout(config.api_url.clone(), config.api_key.clone(), config.http_timeout)?;
            let oracle = HttpPriceOracle::new(config.oracle.url.clone(), config.http_timeout)?;
            let ledger = LocalLedger::open(&config.ledger_path)
                .with_context(|| format!("open ledger {}", config.ledger_path.display()))?;

            Ok(Self::new(
                config,
                Arc::new(ledger),
                Arc::new(chain),
                vault,
                Arc::new(LogNotifier),
                Arc::new(oracle),
                Arc::new(SystemClock),
            ))
        }
    }
}
