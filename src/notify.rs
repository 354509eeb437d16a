//! Notify - Customer-facing payment notices
//!
//! Delivery (templates, SMTP) lives outside the engine. A failed notice is
//! logged by the caller and never rolls back a settled payment.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::amount::Sun;
use crate::payment::{Payment, Plan};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_completion(&self, payment: &Payment, plan: &Plan) -> Result<()>;

    async fn send_underpayment(&self, payment: &Payment, plan: &Plan, remaining: Sun) -> Result<()>;

    async fn send_overpayment(&self, payment: &Payment, plan: &Plan, overpaid: Sun) -> Result<()>;
}

/// Emits each notice as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_completion(&self, payment: &Payment, plan: &Plan) -> Result<()> {
        info!(
            payment_id = %payment.id,
            identity = %payment.identity,
            plan = %plan.name,
            paid = %payment.paid_amount,
            "notice: payment completed"
        );
        Ok(())
    }

    async fn send_underpayment(&self, payment: &Payment, plan: &Plan, remaining: Sun) -> Result<()> {
        info!(
            payment_id = %payment.id,
            identity = %payment.identity,
            plan = %plan.name,
            expected = %payment.expected_amount,
            %remaining,
            "notice: payment underpaid"
        );
        Ok(())
    }

    async fn send_overpayment(&self, payment: &Payment, plan: &Plan, overpaid: Sun) -> Result<()> {
        info!(
            payment_id = %payment.id,
            identity = %payment.identity,
            plan = %plan.name,
            %overpaid,
            "notice: payment overpaid"
        );
        Ok(())
    }
}
