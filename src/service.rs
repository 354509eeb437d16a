//! Payment Service - Create, cancel and inspect payments
//!
//! `create_payment` locks the native amount at the oracle price of the
//! moment; the reconciler never re-quotes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::amount::Sun;
use crate::chain::TronAddress;
use crate::clock::Clock;
use crate::custody::WalletCustody;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::oracle::{native_amount, PriceOracle};
use crate::payment::{Payment, PaymentStatus, Transition};

pub const DEFAULT_CURRENCY: &str = "TRX";

/// What the payer needs: where to send and how much.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub plan_id: String,
    pub identity: String,
    pub currency: String,
    pub amount_usd: Decimal,
    pub amount_sun: Sun,
    pub amount_trx: Decimal,
    pub address: TronAddress,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub address: Option<TronAddress>,
}

pub struct PaymentService {
    ledger: Arc<dyn Ledger>,
    custody: WalletCustody,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        custody: WalletCustody,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        window: chrono::Duration,
    ) -> Self {
        Self { ledger, custody, oracle, clock, window }
    }

    pub async fn create_payment(&self, identity: &str, plan_id: &str, currency_code: Option<&str>) -> Result<PaymentReceipt> {
        let identity = identity.trim();
        if !looks_like_email(identity) {
            return Err(Error::InvalidInput(format!("'{}' is not an email address", identity)));
        }

        let plan = self
            .ledger
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("plan {}", plan_id)))?;
        let code = currency_code.unwrap_or(DEFAULT_CURRENCY);
        let currency = self
            .ledger
            .find_currency(code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("currency {}", code)))?;
        if !currency.enabled {
            return Err(Error::InvalidInput(format!("currency {} is disabled", currency.code)));
        }

        let price = self.oracle.usd_price().await?;
        let expected = native_amount(plan.price_usd, price)?;
        if expected.is_zero() {
            return Err(Error::InvalidInput(format!("plan {} prices to zero", plan.id)));
        }

        let wallet = self.custody.provision(identity).await?;
        let payment = Payment::pending(&wallet, &plan, &currency.code, expected, self.clock.now());
        self.ledger.create_payment(&payment).await?;

        info!(payment_id = %payment.id, plan = %plan.id, address = %wallet.address, expected = %expected, %price, "payment created");

        Ok(PaymentReceipt {
            payment_id: payment.id,
            plan_id: plan.id,
            identity: wallet.identity,
            currency: currency.code,
            amount_usd: plan.price_usd,
            amount_sun: expected,
            amount_trx: expected.to_trx(),
            address: wallet.address,
            expires_at: payment.created_at + self.window,
        })
    }

    /// Cancelling a cancelled payment is a no-op; completed or expired
    /// payments are a conflict.
    pub async fn cancel_payment(&self, id: &str) -> Result<Payment> {
        let payment = self.find(id).await?;
        match payment.status.transition_to(PaymentStatus::Cancelled) {
            Transition::Unchanged => return Ok(payment),
            Transition::Illegal => return Err(Error::Conflict { id: payment.id, status: payment.status }),
            Transition::Apply => {}
        }

        let applied = self
            .ledger
            .update_status(id, PaymentStatus::Pending, PaymentStatus::Cancelled, self.clock.now())
            .await?;
        let current = self.find(id).await?;
        if applied || current.status == PaymentStatus::Cancelled {
            info!(payment_id = %id, "payment cancelled");
            Ok(current)
        } else {
            Err(Error::Conflict { id: current.id, status: current.status })
        }
    }

    pub async fn payment_status(&self, id: &str) -> Result<PaymentView> {
        let payment = self.find(id).await?;
        let address = self.ledger.find_wallet(&payment.wallet_id).await?.map(|w| w.address);
        Ok(PaymentView { payment, address })
    }

    async fn find(&self, id: &str) -> Result<Payment> {
        self.ledger
            .find_payment(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("payment {}", id)))
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@example.com"));
        assert!(!looks_like_email("a@localhost"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("a b@example.com"));
        assert!(!looks_like_email("plain"));
    }
}
