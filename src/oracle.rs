//! Oracle - USD price of the native token
//!
//! The ticker answers `{"symbol": "TRXUSDT", "price": "0.12340000"}`; the
//! price is parsed as `Decimal` and never passes through a float.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use crate::amount::Sun;

pub const DEFAULT_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price?symbol=TRXUSDT";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Price source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed price response: {0}")]
    Decode(String),

    #[error("Unusable price: {0}")]
    InvalidPrice(String),
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD per one whole native token.
    async fn usd_price(&self) -> Result<Decimal, OracleError>;
}

/// Native amount for `usd` at `price`, floored to whole sun.
pub fn native_amount(usd: Decimal, price: Decimal) -> Result<Sun, OracleError> {
    if price <= Decimal::ZERO {
        return Err(OracleError::InvalidPrice(price.to_string()));
    }
    let trx = usd.checked_div(price).ok_or_else(|| OracleError::InvalidPrice(format!("{} / {}", usd, price)))?;
    Sun::from_trx(trx).map_err(|e| OracleError::InvalidPrice(e.to_string()))
}

/// Fixed price, for offline use and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPriceOracle(pub Decimal);

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn usd_price(&self) -> Result<Decimal, OracleError> { Ok(self.0) }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

fn parse_ticker(body: &str) -> Result<Decimal, OracleError> {
    let ticker: TickerResponse = serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))?;
    Decimal::from_str(ticker.price.trim()).map_err(|e| OracleError::Decode(format!("price '{}': {}", ticker.price, e)))
}

#[cfg(feature = "http")]
pub use http::HttpPriceOracle;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;
    use tracing::debug;

    pub struct HttpPriceOracle {
        client: Client,
        url: String,
    }

    impl HttpPriceOracle {
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| OracleError::Unavailable(format!("HTTP client: {}", e)))?;
            Ok(Self { client, url: url.into() })
        }

        pub fn url(&self) -> &str { &self.url }
    }

    #[async_trait]
    impl PriceOracle for HttpPriceOracle {
        async fn usd_price(&self) -> Result<Decimal, OracleError> {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| OracleError::Unavailable(e.to_string()))?;
            if !response.status().is_success() {
                return Err(OracleError::Unavailable(format!("status {}", response.status())));
            }
            let body = response.text().await.map_err(|e| OracleError::Unavailable(e.to_string()))?;
            let price = parse_ticker(&body)?;
            debug!(%price, "price quote");
            Ok(price)
        }
    }
}
