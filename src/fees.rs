//! Fees - How much of a deposit can be swept
//!
//! ```text
//! free       = max(0, limit - used)
//! chargeable = max(0, tx_size_bytes - free)
//! total      = chargeable * sun_per_bandwidth + energy_reserve + safety_buffer
//! sweep      = balance - total           (must be > 0)
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::amount::Sun;
use crate::chain::{ChainReader, ResourceUsage};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Bandwidth a plain transfer consumes
    pub tx_size_bytes: i64,
    pub sun_per_bandwidth: Sun,
    pub energy_reserve: Sun,
    pub safety_buffer: Sun,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tx_size_bytes: 300,
            sun_per_bandwidth: Sun(1_000),
            energy_reserve: Sun(10_000),
            safety_buffer: Sun(50_000),
        }
    }
}

impl FeeSchedule {
    pub fn total_fee(&self, usage: ResourceUsage) -> Sun {
        let chargeable = (self.tx_size_bytes - usage.free()).max(0) as u64;
        Sun(chargeable.saturating_mul(self.sun_per_bandwidth.as_u64()))
            .saturating_add(self.energy_reserve)
            .saturating_add(self.safety_buffer)
    }
}

/// Pure part of the estimate.
pub fn compute_transferable(balance: Sun, usage: ResourceUsage, schedule: &FeeSchedule) -> Result<Sun> {
    let required = schedule.total_fee(usage);
    match balance.checked_sub(required) {
        Some(amount) if !amount.is_zero() => Ok(amount),
        _ => Err(Error::InsufficientBalance { balance, required }),
    }
}

#[derive(Debug, Clone)]
pub struct FeeEstimator {
    reader: ChainReader,
    schedule: FeeSchedule,
}

impl FeeEstimator {
    pub fn new(reader: ChainReader, schedule: FeeSchedule) -> Self { Self { reader, schedule } }

    pub fn schedule(&self) -> &FeeSchedule { &self.schedule }

    pub async fn transferable(&self, address: &str, balance: Sun) -> Result<Sun> {
        let usage = self.reader.resource_usage(address).await?;
        let amount = compute_transferable(balance, usage, &self.schedule)?;
        debug!(%address, %balance, used = usage.used, limit = usage.limit, %amount, "transferable");
        Ok(amount)
    }
}
