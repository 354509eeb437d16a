//! In-process ledger with an optional JSON snapshot on disk.
//!
//! Every applied mutation bumps `revision` and rewrites the snapshot
//! (write-then-rename). A failed write leaves memory untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{Ledger, LedgerError};
use crate::amount::Sun;
use crate::payment::{Currency, Payment, PaymentStatus, PendingPayment, Plan, Transition, Wallet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    wallets: HashMap<String, Wallet>,
    #[serde(default)]
    payments: HashMap<String, Payment>,
    #[serde(default)]
    plans: HashMap<String, Plan>,
    #[serde(default)]
    currencies: HashMap<String, Currency>,
}

pub struct LocalLedger {
    path: Option<PathBuf>,
    state: RwLock<State>,
}

impl Default for LocalLedger {
    fn default() -> Self { Self::in_memory() }
}

impl LocalLedger {
    pub fn in_memory() -> Self { Self { path: None, state: RwLock::new(State::default()) } }

    /// Load the snapshot at `path`, or start empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| LedgerError::Io(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw).map_err(|e| LedgerError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            State::default()
        };
        Ok(Self { path: Some(path), state: RwLock::new(state) })
    }

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    /// Number of applied mutations over the ledger's lifetime.
    pub async fn revision(&self) -> u64 { self.state.read().await.revision }

    /// Upsert a plan (administrative; plans are read-only to the engine).
    pub async fn insert_plan(&self, plan: Plan) -> Result<(), LedgerError> {
        self.mutate(|state| {
            state.plans.insert(plan.id.clone(), plan);
            Ok(((), true))
        })
        .await
    }

    pub async fn insert_currency(&self, currency: Currency) -> Result<(), LedgerError> {
        self.mutate(|state| {
            state.currencies.insert(currency.code.clone(), currency);
            Ok(((), true))
        })
        .await
    }

    /// All payments, oldest first.
    pub async fn payments(&self) -> Vec<Payment> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state.payments.values().cloned().collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        payments
    }

    pub async fn plans(&self) -> Vec<Plan> {
        let state = self.state.read().await;
        let mut plans: Vec<Plan> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        plans
    }

    /// Apply `f` to a copy of the state; commit (and persist) only if it
    /// reports a change.
    async fn mutate<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut State) -> Result<(T, bool), LedgerError>,
    {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            next.revision += 1;
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(out)
    }

    /// Snapshot on a blocking thread; the write guard stays held so
    /// snapshots land in revision order.
    async fn persist(&self, state: &State) -> Result<(), LedgerError> {
        let Some(path) = self.path.clone() else { return Ok(()) };
        let json = serde_json::to_string_pretty(state).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let revision = state.revision;
        let path = tokio::task::spawn_blocking(move || write_snapshot(&path, &json).map(|()| path))
            .await
            .map_err(|e| LedgerError::Io(format!("snapshot task: {e}")))??;
        debug!(revision, path = %path.display(), "ledger persisted");
        Ok(())
    }

    /// Compare-and-set from `Pending`.
    fn transition<'a>(state: &'a mut State, id: &str, to: PaymentStatus, at: DateTime<Utc>) -> Option<&'a mut Payment> {
        let payment = state.payments.get_mut(id)?;
        if payment.status.transition_to(to) != Transition::Apply {
            return None;
        }
        payment.status = to;
        payment.updated_at = at;
        Some(payment)
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn find_pending_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingPayment>, LedgerError> {
        let state = self.state.read().await;
        let mut pending = Vec::new();
        for payment in state.payments.values().filter(|p| p.is_pending() && p.created_at >= cutoff) {
            let (Some(wallet), Some(plan)) = (state.wallets.get(&payment.wallet_id), state.plans.get(&payment.plan_id)) else {
                warn!(payment_id = %payment.id, "pending payment references a missing wallet or plan");
                continue;
            };
            pending.push(PendingPayment { payment: payment.clone(), wallet: wallet.clone(), plan: plan.clone() });
        }
        pending.sort_by(|a, b| a.payment.created_at.cmp(&b.payment.created_at).then_with(|| a.payment.id.cmp(&b.payment.id)));
        Ok(pending)
    }

    async fn find_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>, LedgerError> {
        let state = self.state.read().await;
        let mut stale: Vec<Payment> =
            state.payments.values().filter(|p| p.is_pending() && p.created_at < cutoff).cloned().collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stale)
    }

    async fn mark_completed(&self, id: &str, paid: Sun, completed_at: DateTime<Utc>, tx_id: &str) -> Result<bool, LedgerError> {
        self.mutate(|state| {
            let Some(payment) = Self::transition(state, id, PaymentStatus::Completed, completed_at) else {
                return Ok((false, false));
            };
            payment.paid_amount = paid;
            payment.completed_at = Some(completed_at);
            payment.sweep_tx_id = Some(tx_id.to_string());
            payment.swept = true;
            Ok((true, true))
        })
        .await
    }

    async fn mark_expired(&self, id: &str, at: DateTime<Utc>) -> Result<bool, LedgerError> {
        self.update_status(id, PaymentStatus::Pending, PaymentStatus::Expired, at).await
    }

    async fn update_status(&self, id: &str, from: PaymentStatus, to: PaymentStatus, at: DateTime<Utc>) -> Result<bool, LedgerError> {
        self.mutate(|state| {
            let current = state.payments.get(id).map(|p| p.status);
            if current != Some(from) {
                return Ok((false, false));
            }
            let applied = Self::transition(state, id, to, at).is_some();
            Ok((applied, applied))
        })
        .await
    }

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>, LedgerError> {
        Ok(self.state.read().await.payments.get(id).cloned())
    }

    async fn find_wallet(&self, id: &str) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.state.read().await.wallets.get(id).cloned())
    }

    async fn find_wallet_by_identity(&self, identity: &str) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.state.read().await.wallets.values().find(|w| w.identity == identity).cloned())
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if state.wallets.contains_key(&wallet.id) {
                return Err(LedgerError::Duplicate(format!("wallet id {}", wallet.id)));
            }
            if let Some(existing) = state.wallets.values().find(|w| w.identity == wallet.identity || w.address == wallet.address) {
                return Err(LedgerError::Duplicate(format!("wallet for {} ({})", existing.identity, existing.address)));
            }
            state.wallets.insert(wallet.id.clone(), wallet.clone());
            Ok(((), true))
        })
        .await
    }

    async fn create_payment(&self, payment: &Payment) -> Result<(), LedgerError> {
        self.mutate(|state| {
            if state.payments.contains_key(&payment.id) {
                return Err(LedgerError::Duplicate(format!("payment id {}", payment.id)));
            }
            if !state.wallets.contains_key(&payment.wallet_id) {
                return Err(LedgerError::Dangling(format!("wallet {}", payment.wallet_id)));
            }
            state.payments.insert(payment.id.clone(), payment.clone());
            Ok(((), true))
        })
        .await
    }

    async fn find_plan(&self, id: &str) -> Result<Option<Plan>, LedgerError> {
        Ok(self.state.read().await.plans.get(id).cloned())
    }

    async fn find_currency(&self, code: &str) -> Result<Option<Currency>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.currencies.get(code).or_else(|| state.currencies.get(&code.to_ascii_uppercase())).cloned())
    }
}

/// Write to a sibling temp file, then rename over the snapshot.
fn write_snapshot(path: &Path, json: &str) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LedgerError::Io(format!("mkdir: {e}")))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| LedgerError::Io(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| LedgerError::Io(format!("rename {}: {e}", path.display())))
}

/// `$PAYNODE_ROOT/data/ledger.json`, else the platform data dir.
pub fn default_ledger_path() -> PathBuf {
    let root = std::env::var("PAYNODE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("paynode"));
    root.join("data").join("ledger.json")
}
