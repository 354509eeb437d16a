//! Transfer transactions as returned by the node's HTTP API.
//!
//! The node builds the protobuf `raw_data`; we keep its JSON form untouched so
//! the signed copy can be posted back verbatim with a `signature` array.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{ChainError, TronAddress};
use crate::amount::Sun;

/// Free bandwidth snapshot for an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub used: i64,
    pub limit: i64,
}

impl ResourceUsage {
    pub fn new(used: i64, limit: i64) -> Self { Self { used, limit } }

    pub fn free(&self) -> i64 { (self.limit - self.used).max(0) }
}

/// Unsigned transaction from `createtransaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub tx_id: String,
    pub raw_data_hex: String,
    /// Full JSON body (`txID`, `raw_data`, `raw_data_hex`, `visible`)
    pub body: Value,
}

impl UnsignedTransaction {
    pub fn from_json(body: Value) -> Result<Self, ChainError> {
        if let Some(err) = body.get("Error").and_then(Value::as_str) {
            return Err(ChainError::Node(err.to_string()));
        }
        let tx_id = body["txID"]
            .as_str()
            .ok_or_else(|| ChainError::Decode("createtransaction: missing txID".into()))?
            .to_string();
        let raw_data_hex = body["raw_data_hex"]
            .as_str()
            .ok_or_else(|| ChainError::Decode("createtransaction: missing raw_data_hex".into()))?
            .to_string();
        Ok(Self { tx_id, raw_data_hex, body })
    }

    /// sha256(raw_data); this is what gets signed.
    pub fn digest(&self) -> Result<[u8; 32], ChainError> {
        let raw = hex::decode(&self.raw_data_hex)
            .map_err(|e| ChainError::Decode(format!("raw_data_hex: {}", e)))?;
        Ok(Sha256::digest(&raw).into())
    }

    /// The node is not trusted: the txID must hash the raw data and the
    /// contract must move exactly `amount` from `from` to `to`.
    pub fn verify_transfer(&self, from: &TronAddress, to: &TronAddress, amount: Sun) -> Result<[u8; 32], ChainError> {
        let digest = self.digest()?;
        if hex::encode(digest) != self.tx_id.to_ascii_lowercase() {
            return Err(ChainError::Mismatch("txID does not hash raw_data".into()));
        }

        let value = &self.body["raw_data"]["contract"][0]["parameter"]["value"];
        let owner = parse_contract_address(&value["owner_address"])?;
        let recipient = parse_contract_address(&value["to_address"])?;
        let sent = value["amount"].as_u64().ok_or_else(|| ChainError::Mismatch("missing amount".into()))?;

        if owner != *from || recipient != *to || sent != amount.as_u64() {
            return Err(ChainError::Mismatch(format!(
                "expected {} -> {} ({}), node built {} -> {} ({})",
                from, to, amount, owner, recipient, Sun(sent)
            )));
        }
        Ok(digest)
    }

    pub fn into_signed(mut self, signature: [u8; 65]) -> SignedTransaction {
        self.body["signature"] = Value::Array(vec![Value::String(hex::encode(signature))]);
        SignedTransaction { tx_id: self.tx_id, body: self.body }
    }
}

/// `visible: true` responses carry base58, others carry hex.
fn parse_contract_address(value: &Value) -> Result<TronAddress, ChainError> {
    let s = value.as_str().ok_or_else(|| ChainError::Mismatch("missing contract address".into()))?;
    if s.starts_with('T') {
        return s.parse();
    }
    let bytes = hex::decode(s).map_err(|e| ChainError::InvalidAddress(format!("{}: {}", s, e)))?;
    TronAddress::from_bytes(&bytes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub tx_id: String,
    pub body: Value,
}

/// Result of `broadcasttransaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
}

impl BroadcastReceipt {
    pub fn accepted(txid: impl Into<String>) -> Self {
        Self { result: true, code: Some("SUCCESS".into()), message: None, txid: Some(txid.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.result && self.code.as_deref().map(|c| c == "SUCCESS").unwrap_or(true)
    }

    /// Node messages come hex-encoded; fall back to the raw string.
    pub fn decoded_message(&self) -> String {
        let raw = self.message.clone().unwrap_or_default();
        hex::decode(&raw)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
            .unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FROM: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    fn to_addr() -> TronAddress {
        TronAddress::from_bytes(&hex::decode("417e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap()).unwrap()
    }

    fn unsigned(amount: u64, tamper_id: bool) -> UnsignedTransaction {
        let raw_data_hex = "0a02beef2208deadbeefcafebabe";
        let digest = Sha256::digest(hex::decode(raw_data_hex).unwrap());
        let tx_id = if tamper_id { "00".repeat(32) } else { hex::encode(digest) };
        UnsignedTransaction::from_json(json!({
            "visible": true,
            "txID": tx_id,
            "raw_data_hex": raw_data_hex,
            "raw_data": {"contract": [{"parameter": {"value": {
                "owner_address": FROM,
                "to_address": to_addr().to_hex(),
                "amount": amount,
            }}, "type": "TransferContract"}]},
        }))
        .unwrap()
    }

    #[test]
    fn verify_accepts_matching_transfer() {
        let tx = unsigned(1_000, false);
        assert!(tx.verify_transfer(&FROM.parse().unwrap(), &to_addr(), Sun(1_000)).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_amount_or_txid() {
        let from: TronAddress = FROM.parse().unwrap();
        assert!(matches!(unsigned(999, false).verify_transfer(&from, &to_addr(), Sun(1_000)), Err(ChainError::Mismatch(_))));
        assert!(matches!(unsigned(1_000, true).verify_transfer(&from, &to_addr(), Sun(1_000)), Err(ChainError::Mismatch(_))));
    }

    #[test]
    fn node_error_surfaces() {
        let err = UnsignedTransaction::from_json(json!({"Error": "account does not exist"})).unwrap_err();
        assert_eq!(err, ChainError::Node("account does not exist".into()));
    }

    #[test]
    fn signed_body_carries_signature() {
        let signed = unsigned(1, false).into_signed([0xab; 65]);
        assert_eq!(signed.body["signature"][0].as_str().unwrap().len(), 130);
    }

    #[test]
    fn receipt_message_decoding() {
        let receipt: BroadcastReceipt = serde_json::from_value(json!({
            "code": "SIGERROR",
            "message": hex::encode("validate signature error"),
        }))
        .unwrap();
        assert!(!receipt.is_success());
        assert_eq!(receipt.decoded_message(), "validate signature error");
        assert!(BroadcastReceipt::accepted("abc").is_success());
    }

    #[test]
    fn free_bandwidth_clamps() {
        assert_eq!(ResourceUsage::new(100, 600).free(), 500);
        assert_eq!(ResourceUsage::new(700, 600).free(), 0);
    }
}
