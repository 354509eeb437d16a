//! TronGrid HTTP client
//!
//! | Operation        | Endpoint                         |
//! |------------------|----------------------------------|
//! | account_balance  | POST /wallet/getaccount          |
//! | account_resource | POST /wallet/getaccountresource  |
//! | create_transfer  | POST /wallet/createtransaction   |
//! | broadcast        | POST /wallet/broadcasttransaction|
//!
//! All requests use `visible: true` so addresses travel as base58.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    BroadcastReceipt, ChainClient, ChainError, Network, ResourceUsage, SignedTransaction, TronAddress,
    UnsignedTransaction,
};
use crate::amount::Sun;

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// `getaccount` omits `balance` for empty and unactivated accounts.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct AccountResourceResponse {
    #[serde(rename = "freeNetUsed", default)]
    free_net_used: i64,
    #[serde(rename = "freeNetLimit", default)]
    free_net_limit: i64,
}

pub struct TronGridClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TronGridClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ChainError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Unavailable(format!("HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, api_key: api_key.filter(|k| !k.is_empty()) })
    }

    pub fn for_network(network: Network, api_key: Option<String>) -> Result<Self, ChainError> {
        Self::new(network.default_api_url(), api_key)
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "node request");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{}: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "node returned error status");
            return Err(ChainError::Http { status: status.as_u16(), body });
        }

        response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl ChainClient for TronGridClient {
    async fn account_balance(&self, address: &TronAddress) -> Result<Sun, ChainError> {
        let body = self
            .post("/wallet/getaccount", &json!({ "address": address.to_base58(), "visible": true }))
            .await?;
        let account: AccountResponse =
            serde_json::from_value(body).map_err(|e| ChainError::Decode(format!("getaccount: {}", e)))?;
        Ok(Sun(account.balance))
    }

    async fn account_resource(&self, address: &TronAddress) -> Result<ResourceUsage, ChainError> {
        let body = self
            .post("/wallet/getaccountresource", &json!({ "address": address.to_base58(), "visible": true }))
            .await?;
        let resource: AccountResourceResponse =
            serde_json::from_value(body).map_err(|e| ChainError::Decode(format!("getaccountresource: {}", e)))?;
        Ok(ResourceUsage::new(resource.free_net_used, resource.free_net_limit))
    }

    async fn create_transfer(&self, from: &TronAddress, to: &TronAddress, amount: Sun) -> Result<UnsignedTransaction, ChainError> {
        let body = self
            .post(
                "/wallet/createtransaction",
                &json!({
                    "owner_address": from.to_base58(),
                    "to_address": to.to_base58(),
                    "amount": amount.as_u64(),
                    "visible": true,
                }),
            )
            .await?;
        UnsignedTransaction::from_json(body)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt, ChainError> {
        let body = self.post("/wallet/broadcasttransaction", &tx.body).await?;
        serde_json::from_value(body).map_err(|e| ChainError::Decode(format!("broadcasttransaction: {}", e)))
    }
}

impl std::fmt::Debug for TronGridClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TronGridClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_balance_is_zero() {
        let account: AccountResponse = serde_json::from_value(json!({"address": "T..."})).unwrap();
        assert_eq!(account.balance, 0);
        let account: AccountResponse = serde_json::from_value(json!({"balance": 5_000_000u64})).unwrap();
        assert_eq!(account.balance, 5_000_000);
    }

    #[test]
    fn missing_resource_fields_are_zero() {
        let r: AccountResourceResponse = serde_json::from_value(json!({"freeNetLimit": 600})).unwrap();
        assert_eq!((r.free_net_used, r.free_net_limit), (0, 600));
    }

    #[test]
    fn base_url_normalized_and_key_hidden() {
        let client = TronGridClient::new("https://api.shasta.trongrid.io/", Some("secret".into())).unwrap();
        assert_eq!(client.base_url(), "https://api.shasta.trongrid.io");
        assert!(!format!("{:?}", client).contains("secret"));

        let client = TronGridClient::for_network(Network::Nile, Some(String::new())).unwrap();
        assert!(client.api_key.is_none());
    }

    #[test]
    fn unreachable_node_is_unavailable() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let client =
                TronGridClient::with_timeout("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap();
            let addr: TronAddress = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".parse().unwrap();
            assert!(matches!(client.account_balance(&addr).await, Err(ChainError::Unavailable(_))));
        });
    }
}
