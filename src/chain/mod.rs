//! Chain - Client side of the TRON network
//!
//! ```text
//! ┌──────────────┐      ┌─────────────────────┐      ┌──────────────┐
//! │ ChainReader  │─────►│ dyn ChainClient     │─────►│ full node    │
//! │ (validates)  │      │  TronGridClient     │ HTTP │ /wallet/...  │
//! └──────────────┘      │  (or test double)   │      └──────────────┘
//!                       └─────────────────────┘
//! ```
//!
//! The engine never runs a node. Signing is local (see `sweep`); the node only
//! builds unsigned transactions and relays signed ones.

pub mod address;
#[cfg(feature = "http")]
pub mod http;
pub mod tx;

pub use address::{TronAddress, ADDRESS_PREFIX};
#[cfg(feature = "http")]
pub use http::TronGridClient;
pub use tx::{BroadcastReceipt, ResourceUsage, SignedTransaction, UnsignedTransaction};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::amount::Sun;

// ============================================================================
// Network
// ============================================================================

/// Public TRON networks with a TronGrid-compatible HTTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Shasta,
    Nile,
}

impl Network {
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.trongrid.io",
            Network::Shasta => "https://api.shasta.trongrid.io",
            Network::Nile => "https://nile.trongrid.io",
        }
    }

    pub fn is_mainnet(&self) -> bool { matches!(self, Network::Mainnet) }
}

impl FromStr for Network {
    type Err = String;

    /// Accepts network names and deployment-environment aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "production" => Ok(Network::Mainnet),
            "shasta" | "testnet" | "development" | "staging" | "test" => Ok(Network::Shasta),
            "nile" => Ok(Network::Nile),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Shasta => "shasta",
            Network::Nile => "nile",
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed node response: {0}")]
    Decode(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Unsigned transaction mismatch: {0}")]
    Mismatch(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Broadcast rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl ChainError {
    /// Worth retrying on the next tick without any state change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Unavailable(_)
                | ChainError::Http { .. }
                | ChainError::Decode(_)
                | ChainError::Node(_)
                | ChainError::Broadcast(_)
                | ChainError::Rejected { .. }
        )
    }
}

// ============================================================================
// Client
// ============================================================================

/// Raw node operations. Implementations do not validate addresses.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn account_balance(&self, address: &TronAddress) -> Result<Sun, ChainError>;

    async fn account_resource(&self, address: &TronAddress) -> Result<ResourceUsage, ChainError>;

    async fn create_transfer(
        &self,
        from: &TronAddress,
        to: &TronAddress,
        amount: Sun,
    ) -> Result<UnsignedTransaction, ChainError>;

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt, ChainError>;
}

/// Read side used by the reconciler and the fee estimator.
#[derive(Clone)]
pub struct ChainReader {
    client: Arc<dyn ChainClient>,
}

impl ChainReader {
    pub fn new(client: Arc<dyn ChainClient>) -> Self { Self { client } }

    pub fn client(&self) -> &Arc<dyn ChainClient> { &self.client }

    /// Balance in sun. Malformed input fails before any network call.
    pub async fn balance(&self, address: &str) -> Result<Sun, ChainError> {
        let address: TronAddress = address.parse()?;
        self.client.account_balance(&address).await
    }

    pub async fn resource_usage(&self, address: &str) -> Result<ResourceUsage, ChainError> {
        let address: TronAddress = address.parse()?;
        self.client.account_resource(&address).await
    }
}

impl fmt::Debug for ChainReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ChainReader") }
}
