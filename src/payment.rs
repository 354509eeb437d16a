//! Payment - Records and the status state machine
//!
//! ```text
//!              ┌────────────► Completed   (after a successful sweep)
//!              │
//!   Pending ───┼────────────► Cancelled   (caller request)
//!              │
//!              └────────────► Expired     (window elapsed, scheduler)
//! ```
//!
//! Every non-pending status is terminal. Storage applies transitions with a
//! compare-and-set on `Pending`, so a second writer loses instead of
//! overwriting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::amount::Sun;
use crate::chain::TronAddress;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

/// Outcome of asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    /// Already in the requested status
    Unchanged,
    Illegal,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool { !matches!(self, PaymentStatus::Pending) }

    pub fn transition_to(self, to: PaymentStatus) -> Transition {
        match (self, to) {
            (from, to) if from == to => Transition::Unchanged,
            (PaymentStatus::Pending, _) => Transition::Apply,
            _ => Transition::Illegal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Deposit wallet. One per identity, never deleted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    /// Owning identity (customer email)
    pub identity: String,
    pub address: TronAddress,
    /// Vault blob of the raw 32-byte private key
    pub encrypted_key: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("address", &self.address)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_usd: Decimal,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub is_token: bool,
    #[serde(default)]
    pub contract_address: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub wallet_id: String,
    pub plan_id: String,
    pub currency_code: String,
    pub identity: String,
    pub amount_usd: Decimal,
    /// Locked at creation
    pub expected_amount: Sun,
    pub paid_amount: Sun,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sweep_tx_id: Option<String>,
    #[serde(default)]
    pub swept: bool,
}

impl Payment {
    /// New pending payment with a fresh id.
    pub fn pending(wallet: &Wallet, plan: &Plan, currency_code: &str, expected_amount: Sun, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_id: wallet.id.clone(),
            plan_id: plan.id.clone(),
            currency_code: currency_code.to_string(),
            identity: wallet.identity.clone(),
            amount_usd: plan.price_usd,
            expected_amount,
            paid_amount: Sun::ZERO,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            sweep_tx_id: None,
            swept: false,
        }
    }

    pub fn is_pending(&self) -> bool { self.status == PaymentStatus::Pending }

    /// Strictly older than `window` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) > window
    }
}

/// Pending payment joined with its wallet and plan, as the reconciler sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub payment: Payment,
    pub wallet: Wallet,
    pub plan: Plan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixture() -> (Wallet, Plan) {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let wallet = Wallet {
            id: "w1".into(),
            identity: "a@example.com".into(),
            address: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".parse().unwrap(),
            encrypted_key: "c2VjcmV0".into(),
            created_at: created,
        };
        let plan = Plan {
            id: "p1".into(),
            name: "Monthly".into(),
            description: String::new(),
            price_usd: Decimal::new(999, 2),
            duration_days: 30,
        };
        (wallet, plan)
    }

    #[test]
    fn terminal_states_never_move() {
        use PaymentStatus::*;
        for from in [Completed, Cancelled, Expired] {
            assert!(from.is_terminal());
            for to in [Pending, Completed, Cancelled, Expired] {
                let expected = if from == to { Transition::Unchanged } else { Transition::Illegal };
                assert_eq!(from.transition_to(to), expected, "{} -> {}", from, to);
            }
        }
        assert_eq!(Pending.transition_to(Cancelled), Transition::Apply);
        assert_eq!(Pending.transition_to(Pending), Transition::Unchanged);
    }

    #[test]
    fn expiry_is_strict() {
        let (wallet, plan) = fixture();
        let t = wallet.created_at;
        let payment = Payment::pending(&wallet, &plan, "TRX", Sun(100), t);
        let window = Duration::minutes(15);
        assert!(!payment.is_expired_at(t + window, window));
        assert!(payment.is_expired_at(t + window + Duration::seconds(1), window));
    }

    #[test]
    fn pending_copies_plan_price() {
        let (wallet, plan) = fixture();
        let payment = Payment::pending(&wallet, &plan, "TRX", Sun(5), wallet.created_at);
        assert_eq!(payment.amount_usd, plan.price_usd);
        assert_eq!(payment.identity, wallet.identity);
        assert!(payment.is_pending() && !payment.swept);
    }

    #[test]
    fn wallet_debug_hides_key_blob() {
        let (wallet, _) = fixture();
        assert!(!format!("{:?}", wallet).contains("c2VjcmV0"));
    }

    #[test]
    fn status_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Expired).unwrap(), "\"expired\"");
        assert_eq!("cancelled".parse::<PaymentStatus>().unwrap(), PaymentStatus::Cancelled);
    }
}
