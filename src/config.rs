//! Engine Configuration - built by the binary, passed down
//!
//! Read from `PAYNODE_*` variables (legacy gateway names accepted as
//! fallbacks). Anything unset takes the default below.
//!
//! | Variable                       | Default                     |
//! |--------------------------------|-----------------------------|
//! | `PAYNODE_NETWORK` / `APP_ENV`  | `shasta`                    |
//! | `PAYNODE_API_URL`              | network's TronGrid URL      |
//! | `PAYNODE_API_KEY`              | none                        |
//! | `PAYNODE_HOT_WALLET`           | required for sweeps         |
//! | `PAYNODE_VAULT_KEY`            | required for sweeps         |
//! | `PAYNODE_INTERVAL_SECS`        | 30                          |
//! | `PAYNODE_WINDOW_SECS`          | 900                         |
//! | `PAYNODE_COMPLETE_RATIO`       | 0.95                        |
//! | `PAYNODE_TOLERANCE_SUN`        | 1000                        |
//! | `PAYNODE_TX_SIZE_BYTES`        | 300                         |
//! | `PAYNODE_SUN_PER_BANDWIDTH`    | 1000                        |
//! | `PAYNODE_ENERGY_RESERVE_SUN`   | 10000                       |
//! | `PAYNODE_SAFETY_BUFFER_SUN`    | 50000                       |
//! | `PAYNODE_ORACLE_URL`           | Binance TRXUSDT ticker      |
//! | `PAYNODE_HTTP_TIMEOUT_SECS`    | 15                          |
//! | `PAYNODE_LEDGER_PATH`          | `<data dir>/ledger.json`    |

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::amount::Sun;
use crate::chain::{Network, TronAddress};
use crate::classify::Thresholds;
use crate::fees::FeeSchedule;
use crate::ledger::default_ledger_path;
use crate::oracle::DEFAULT_TICKER_URL;
use crate::vault::VaultKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing setting {0}")]
    Missing(&'static str),

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Pending payments older than this are expired
    pub payment_window: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self { Self { interval: Duration::from_secs(30), payment_window: chrono::Duration::minutes(15) } }
}

impl SchedulerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self { self.interval = interval; self }
    pub fn with_payment_window(mut self, window: chrono::Duration) -> Self { self.payment_window = window; self }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub url: String,
}

impl Default for OracleConfig {
    fn default() -> Self { Self { url: DEFAULT_TICKER_URL.into() } }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub network: Network,
    pub api_url: String,
    pub api_key: Option<String>,
    pub hot_wallet: Option<TronAddress>,
    pub vault_key: Option<VaultKey>,
    pub scheduler: SchedulerConfig,
    pub thresholds: Thresholds,
    pub fees: FeeSchedule,
    pub oracle: OracleConfig,
    pub http_timeout: Duration,
    pub ledger_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self { Self::new(Network::default()) }
}

impl EngineConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            api_url: network.default_api_url().into(),
            api_key: None,
            hot_wallet: None,
            vault_key: None,
            scheduler: SchedulerConfig::default(),
            thresholds: Thresholds::default(),
            fees: FeeSchedule::default(),
            oracle: OracleConfig::default(),
            http_timeout: Duration::from_secs(15),
            ledger_path: default_ledger_path(),
        }
    }
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self { self.api_url = url.into(); self }
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self { self.api_key = Some(key.into()); self }
    pub fn with_hot_wallet(mut self, address: TronAddress) -> Self { self.hot_wallet = Some(address); self }
    pub fn with_vault_key(mut self, key: VaultKey) -> Self { self.vault_key = Some(key); self }
    pub fn with_scheduler(mut self, s: SchedulerConfig) -> Self { self.scheduler = s; self }
    pub fn with_thresholds(mut self, t: Thresholds) -> Self { self.thresholds = t; self }
    pub fn with_fees(mut self, f: FeeSchedule) -> Self { self.fees = f; self }
    pub fn with_oracle_url(mut self, url: impl Into<String>) -> Self { self.oracle.url = url.into(); self }
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self { self.ledger_path = path.into(); self }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Build from any key/value source. Present-but-malformed values fail
    /// here; absent required values fail in `validate`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));

        let network = match get(&["PAYNODE_NETWORK", "APP_ENV"]) {
            Some(v) => Network::from_str(&v).map_err(|reason| ConfigError::Invalid { key: "PAYNODE_NETWORK", reason })?,
            None => Network::default(),
        };
        let mut config = Self::new(network);

        if let Some(url) = get(&["PAYNODE_API_URL"]) {
            config.api_url = url;
        }
        config.api_key = get(&["PAYNODE_API_KEY", "TRON_GRID_API_KEY"]);

        if let Some(v) = get(&["PAYNODE_HOT_WALLET", "TRX_HOT_WALLET_ADDRESS"]) {
            let address = v.parse().map_err(|e: crate::chain::ChainError| ConfigError::Invalid {
                key: "PAYNODE_HOT_WALLET",
                reason: e.to_string(),
            })?;
            config.hot_wallet = Some(address);
        }
        if let Some(v) = get(&["PAYNODE_VAULT_KEY", "TRX_WALLET_ENCRYPTION_KEY"]) {
            let key = VaultKey::parse(&v).map_err(|e| ConfigError::Invalid { key: "PAYNODE_VAULT_KEY", reason: e.to_string() })?;
            config.vault_key = Some(key);
        }

        if let Some(secs) = parse::<u64>("PAYNODE_INTERVAL_SECS", get(&["PAYNODE_INTERVAL_SECS"]))? {
            config.scheduler.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<i64>("PAYNODE_WINDOW_SECS", get(&["PAYNODE_WINDOW_SECS"]))? {
            config.scheduler.payment_window = chrono::Duration::try_seconds(secs)
                .ok_or(ConfigError::Invalid { key: "PAYNODE_WINDOW_SECS", reason: format!("{} out of range", secs) })?;
        }

        if let Some(ratio) = parse::<Decimal>("PAYNODE_COMPLETE_RATIO", get(&["PAYNODE_COMPLETE_RATIO"]))? {
            config.thresholds = Thresholds::from_ratio(ratio, config.thresholds.tolerance)
                .ok_or(ConfigError::Invalid { key: "PAYNODE_COMPLETE_RATIO", reason: ratio.to_string() })?;
        }
        if let Some(sun) = parse::<u64>("PAYNODE_TOLERANCE_SUN", get(&["PAYNODE_TOLERANCE_SUN"]))? {
            config.thresholds.tolerance = Sun(sun);
        }

        if let Some(bytes) = parse::<i64>("PAYNODE_TX_SIZE_BYTES", get(&["PAYNODE_TX_SIZE_BYTES"]))? {
            config.fees.tx_size_bytes = bytes;
        }
        if let Some(sun) = parse::<u64>("PAYNODE_SUN_PER_BANDWIDTH", get(&["PAYNODE_SUN_PER_BANDWIDTH"]))? {
            config.fees.sun_per_bandwidth = Sun(sun);
        }
        if let Some(sun) = parse::<u64>("PAYNODE_ENERGY_RESERVE_SUN", get(&["PAYNODE_ENERGY_RESERVE_SUN"]))? {
            config.fees.energy_reserve = Sun(sun);
        }
        if let Some(sun) = parse::<u64>("PAYNODE_SAFETY_BUFFER_SUN", get(&["PAYNODE_SAFETY_BUFFER_SUN"]))? {
            config.fees.safety_buffer = Sun(sun);
        }

        if let Some(url) = get(&["PAYNODE_ORACLE_URL", "BINANCE_API_URL"]) {
            config.oracle.url = url;
        }
        if let Some(secs) = parse::<u64>("PAYNODE_HTTP_TIMEOUT_SECS", get(&["PAYNODE_HTTP_TIMEOUT_SECS"]))? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = get(&["PAYNODE_LEDGER_PATH"]) {
            config.ledger_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Startup checks for a deployment that sweeps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault_key.is_none() {
            return Err(ConfigError::Missing("PAYNODE_VAULT_KEY"));
        }
        if self.hot_wallet.is_none() {
            return Err(ConfigError::Missing("PAYNODE_HOT_WALLET"));
        }
        if self.scheduler.interval.is_zero() {
            return Err(ConfigError::Invalid { key: "PAYNODE_INTERVAL_SECS", reason: "must be positive".into() });
        }
        if self.scheduler.payment_window <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid { key: "PAYNODE_WINDOW_SECS", reason: "must be positive".into() });
        }
        if self.thresholds.complete_ratio_bps == 0 {
            return Err(ConfigError::Invalid { key: "PAYNODE_COMPLETE_RATIO", reason: "must be positive".into() });
        }
        Ok(())
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| v.parse::<T>().map_err(|e| ConfigError::Invalid { key, reason: format!("'{}': {}", v, e) }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const HOT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    #[test]
    fn defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.network, Network::Shasta);
        assert_eq!(config.api_url, "https://api.shasta.trongrid.io");
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.fees, FeeSchedule::default());
        assert_eq!(config.validate(), Err(ConfigError::Missing("PAYNODE_VAULT_KEY")));
    }

    #[test]
    fn full_environment() {
        let key = "ab".repeat(32);
        let config = EngineConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("PAYNODE_API_KEY", "k"),
            ("PAYNODE_HOT_WALLET", HOT),
            ("PAYNODE_VAULT_KEY", &key),
            ("PAYNODE_INTERVAL_SECS", "10"),
            ("PAYNODE_WINDOW_SECS", "600"),
            ("PAYNODE_COMPLETE_RATIO", "0.9"),
            ("PAYNODE_TOLERANCE_SUN", "5000"),
            ("PAYNODE_SAFETY_BUFFER_SUN", "0"),
        ]))
        .unwrap();

        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.api_url, "https://api.trongrid.io");
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.hot_wallet.unwrap().to_string(), HOT);
        assert_eq!(config.scheduler.interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.payment_window, chrono::Duration::minutes(10));
        assert_eq!(config.thresholds, Thresholds::new(9_000, Sun(5_000)));
        assert_eq!(config.fees.safety_buffer, Sun::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn legacy_names_accepted() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TRX_HOT_WALLET_ADDRESS", HOT),
            ("TRX_WALLET_ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
            ("TRON_GRID_API_KEY", "legacy"),
        ]))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_key.as_deref(), Some("legacy"));
    }

    #[test]
    fn malformed_values_fail() {
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("PAYNODE_VAULT_KEY", "short")])),
            Err(ConfigError::Invalid { key: "PAYNODE_VAULT_KEY", .. })
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("PAYNODE_HOT_WALLET", "0xdead")])),
            Err(ConfigError::Invalid { key: "PAYNODE_HOT_WALLET", .. })
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("PAYNODE_INTERVAL_SECS", "soon")])),
            Err(ConfigError::Invalid { key: "PAYNODE_INTERVAL_SECS", .. })
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("PAYNODE_NETWORK", "moon")])),
            Err(ConfigError::Invalid { key: "PAYNODE_NETWORK", .. })
        ));
    }

    #[test]
    fn missing_hot_wallet_is_fatal() {
        let config = EngineConfig::default().with_vault_key(VaultKey::from_bytes([1; 32]));
        assert_eq!(config.validate(), Err(ConfigError::Missing("PAYNODE_HOT_WALLET")));
    }
}
