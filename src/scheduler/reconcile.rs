//! One reconciliation pass over pending payments.
//!
//! ```text
//! stale (created < now - window) ─────────────────────────► Expired
//!
//! recent, per payment:
//!   expired by clock? ──► Expired
//!   wallet swept this pass? ──► defer
//!   balance ─► classify ─┬─ Complete ─► transferable ─► sweep ─► Completed ─► notify
//!                        ├─ Underpaid ─► notify once per observed balance
//!                        └─ Waiting
//! ```
//!
//! Failures are per payment: the payment stays pending and the next tick
//! retries from a fresh balance.
//!
//! A sweep that broadcast but could not be recorded withholds underpayment
//! notices for that payment; what remains on the address is the fee buffer.
//! Per-payment memory is dropped once a payment leaves the pending set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::TickAction;
use crate::amount::Sun;
use crate::chain::{ChainReader, TronAddress};
use crate::classify::{classify, Classification, Thresholds};
use crate::clock::Clock;
use crate::error::{ErrorClass, Result};
use crate::fees::FeeEstimator;
use crate::ledger::Ledger;
use crate::notify::Notifier;
use crate::payment::{PaymentStatus, PendingPayment};
use crate::sweep::Sweeper;

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub examined: usize,
    pub expired: usize,
    pub completed: usize,
    pub underpaid: usize,
    pub waiting: usize,
    /// Wallet already swept earlier in this pass
    pub deferred: usize,
    pub failed: usize,
}

enum Settled {
    Completed,
    Underpaid,
    Waiting,
}

pub struct Reconciler {
    ledger: Arc<dyn Ledger>,
    reader: ChainReader,
    fees: FeeEstimator,
    sweeper: Sweeper,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    hot_wallet: TronAddress,
    thresholds: Thresholds,
    window: chrono::Duration,
    /// Last balance an underpayment notice went out for, per payment
    underpaid_notified: Mutex<HashMap<String, Sun>>,
    /// Broadcast sweeps whose completion never reached the ledger
    unrecorded_sweeps: Mutex<HashMap<String, String>>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        reader: ChainReader,
        fees: FeeEstimator,
        sweeper: Sweeper,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        hot_wallet: TronAddress,
        thresholds: Thresholds,
        window: chrono::Duration,
    ) -> Self {
        Self {
            ledger,
            reader,
            fees,
            sweeper,
            notifier,
            clock,
            hot_wallet,
            thresholds,
            window,
            underpaid_notified: Mutex::new(HashMap::new()),
            unrecorded_sweeps: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run_pass(&self) -> Result<PassReport> {
        let mut report = PassReport::default();
        let now = self.clock.now();
        let cutoff = now - self.window;

        for payment in self.ledger.find_pending_older_than(cutoff).await? {
            if self.expire(&payment.id, now).await {
                report.expired += 1;
            }
        }

        let mut swept_wallets = HashSet::new();
        let mut live = HashSet::new();
        for pending in self.ledger.find_pending_since(cutoff).await? {
            report.examined += 1;
            let id = pending.payment.id.clone();
            live.insert(id.clone());

            let now = self.clock.now();
            if pending.payment.is_expired_at(now, self.window) {
                if self.expire(&id, now).await {
                    report.expired += 1;
                }
                continue;
            }

            if swept_wallets.contains(&pending.wallet.id) {
                debug!(payment_id = %id, wallet_id = %pending.wallet.id, "wallet already swept this pass, deferring");
                report.deferred += 1;
                continue;
            }

            match self.evaluate(&pending, &mut swept_wallets).await {
                Ok(Settled::Completed) => report.completed += 1,
                Ok(Settled::Underpaid) => report.underpaid += 1,
                Ok(Settled::Waiting) => report.waiting += 1,
                Err(e) => {
                    report.failed += 1;
                    match e.class() {
                        ErrorClass::PermanentPerPayment => info!(payment_id = %id, error = %e, "payment not settleable yet"),
                        ErrorClass::Fatal => error!(payment_id = %id, error = %e, "payment evaluation failed"),
                        _ => warn!(payment_id = %id, error = %e, "payment evaluation failed, retrying next tick"),
                    }
                }
            }
        }

        self.retain(&live);
        Ok(report)
    }

    /// Payments the reconciler still remembers notices or unrecorded sweeps for.
    pub fn tracked_payments(&self) -> usize {
        let notified = lock(&self.underpaid_notified);
        let unrecorded = lock(&self.unrecorded_sweeps);
        notified.keys().chain(unrecorded.keys()).collect::<HashSet<_>>().len()
    }

    async fn expire(&self, id: &str, now: DateTime<Utc>) -> bool {
        match self.ledger.mark_expired(id, now).await {
            Ok(applied) => {
                if applied {
                    info!(payment_id = %id, "payment expired");
                    self.forget(id);
                }
                applied
            }
            Err(e) => {
                warn!(payment_id = %id, error = %e, "failed to expire payment");
                false
            }
        }
    }

    async fn evaluate(&self, pending: &PendingPayment, swept_wallets: &mut HashSet<String>) -> Result<Settled> {
        let PendingPayment { payment, wallet, plan } = pending;
        let address = wallet.address.to_string();
        let balance = self.reader.balance(&address).await?;

        match classify(balance, payment.expected_amount, &self.thresholds) {
            Classification::Complete { overpaid } => {
                let amount = self.fees.transferable(&address, balance).await?;
                let tx_id = self.sweeper.sweep(wallet, &self.hot_wallet, amount).await?;
                swept_wallets.insert(wallet.id.clone());

                let completed_at = self.clock.now();
                let applied = match self.ledger.mark_completed(&payment.id, balance, completed_at, &tx_id).await {
                    Ok(applied) => applied,
                    Err(e) => {
                        error!(payment_id = %payment.id, %tx_id, error = %e, "sweep broadcast but payment not recorded");
                        lock(&self.unrecorded_sweeps).insert(payment.id.clone(), tx_id.clone());
                        return Err(e.into());
                    }
                };
                if !applied {
                    warn!(payment_id = %payment.id, %tx_id, "payment left pending state during sweep; not notifying");
                    return Ok(Settled::Completed);
                }
                self.forget(&payment.id);
                info!(payment_id = %payment.id, %tx_id, %balance, swept = %amount, "payment completed");

                let mut settled = payment.clone();
                settled.status = PaymentStatus::Completed;
                settled.paid_amount = balance;
                settled.completed_at = Some(completed_at);
                settled.updated_at = completed_at;
                settled.sweep_tx_id = Some(tx_id);
                settled.swept = true;

                let sent = match overpaid {
                    Some(extra) => self.notifier.send_overpayment(&settled, plan, extra).await,
                    None => self.notifier.send_completion(&settled, plan).await,
                };
                if let Err(e) = sent {
                    warn!(payment_id = %payment.id, error = %e, "completion notice failed");
                }
                Ok(Settled::Completed)
            }
            Classification::Underpaid { remaining, notify } => {
                debug!(payment_id = %payment.id, %balance, %remaining, "payment underpaid");
                let unrecorded = lock(&self.unrecorded_sweeps).get(&payment.id).cloned();
                if let Some(tx_id) = unrecorded {
                    warn!(payment_id = %payment.id, %tx_id, %balance, "swept but unrecorded; withholding underpayment notice");
                    return Ok(Settled::Underpaid);
                }
                if notify && self.first_notice(&payment.id, balance) {
                    if let Err(e) = self.notifier.send_underpayment(payment, plan, remaining).await {
                        warn!(payment_id = %payment.id, error = %e, "underpayment notice failed");
                        self.forget(&payment.id);
                    }
                }
                Ok(Settled::Underpaid)
            }
            Classification::Waiting => Ok(Settled::Waiting),
        }
    }

    /// Records `balance` and reports whether it differs from the last notice.
    fn first_notice(&self, id: &str, balance: Sun) -> bool {
        lock(&self.underpaid_notified).insert(id.to_string(), balance) != Some(balance)
    }

    fn forget(&self, id: &str) {
        lock(&self.underpaid_notified).remove(id);
        lock(&self.unrecorded_sweeps).remove(id);
    }

    /// Drop memory of payments that left the pending set by any writer.
    fn retain(&self, live: &HashSet<String>) {
        lock(&self.underpaid_notified).retain(|id, _| live.contains(id));
        lock(&self.unrecorded_sweeps).retain(|id, _| live.contains(id));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) }

#[async_trait]
impl TickAction for Reconciler {
    type Output = PassReport;

    async fn run(&self) -> anyhow::Result<PassReport> { Ok(self.run_pass().await?) }
}
