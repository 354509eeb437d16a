//! Classify - Observed balance versus expected amount
//!
//! | Condition                                          | Result     |
//! |----------------------------------------------------|------------|
//! | `balance * 10000 >= expected * ratio_bps`          | Complete   |
//! | `abs(balance - expected) <= tolerance`             | Complete   |
//! | otherwise, `balance > 0`                           | Underpaid  |
//! | otherwise                                          | Waiting    |
//!
//! A complete payment is also overpaid when `balance > expected + tolerance`.
//! Underpayments at or below the tolerance are dust and not worth a notice.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::Sun;

pub const BPS_SCALE: u64 = 10_000;

/// Acceptance thresholds, configurable per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum `balance / expected`, in basis points
    pub complete_ratio_bps: u64,
    /// Absolute tolerance around the expected amount
    pub tolerance: Sun,
}

impl Default for Thresholds {
    fn default() -> Self { Self { complete_ratio_bps: 9_500, tolerance: Sun(1_000) } }
}

impl Thresholds {
    pub fn new(complete_ratio_bps: u64, tolerance: Sun) -> Self { Self { complete_ratio_bps, tolerance } }

    /// Ratio given as a fraction (`0.95`), truncated to whole basis points.
    pub fn from_ratio(ratio: Decimal, tolerance: Sun) -> Option<Self> {
        if ratio.is_sign_negative() {
            return None;
        }
        let bps = (ratio * Decimal::from(BPS_SCALE)).trunc().to_u64()?;
        Some(Self::new(bps, tolerance))
    }

    pub fn ratio(&self) -> Decimal { Decimal::new(self.complete_ratio_bps as i64, 4) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Complete { overpaid: Option<Sun> },
    Underpaid { remaining: Sun, notify: bool },
    Waiting,
}

impl Classification {
    pub fn is_complete(&self) -> bool { matches!(self, Classification::Complete { .. }) }
}

pub fn classify(balance: Sun, expected: Sun, thresholds: &Thresholds) -> Classification {
    let by_ratio = balance.as_u64() as u128 * BPS_SCALE as u128
        >= expected.as_u64() as u128 * thresholds.complete_ratio_bps as u128;
    let within_tolerance = balance.abs_diff(expected) <= thresholds.tolerance;

    if by_ratio || within_tolerance {
        let overpaid = (balance > expected.saturating_add(thresholds.tolerance)).then(|| balance - expected);
        return Classification::Complete { overpaid };
    }

    if balance.is_zero() {
        return Classification::Waiting;
    }

    Classification::Underpaid { remaining: expected - balance, notify: balance > thresholds.tolerance }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trx(s: &str) -> Sun { Sun::from_trx(s.parse().unwrap()).unwrap() }

    #[test]
    fn ratio_boundary_is_inclusive() {
        let t = Thresholds::default();
        assert_eq!(classify(trx("95"), trx("100"), &t), Classification::Complete { overpaid: None });
    }

    #[test]
    fn just_below_ratio_is_underpaid() {
        let t = Thresholds::default();
        assert_eq!(
            classify(trx("94.99"), trx("100"), &t),
            Classification::Underpaid { remaining: trx("5.01"), notify: true }
        );
    }

    #[test]
    fn overpayment_reported() {
        let t = Thresholds::default();
        assert_eq!(classify(trx("100.5"), trx("100"), &t), Classification::Complete { overpaid: Some(trx("0.5")) });
        // inside tolerance counts as exact
        assert_eq!(classify(trx("100.001"), trx("100"), &t), Classification::Complete { overpaid: None });
    }

    #[test]
    fn tolerance_rescues_small_amounts() {
        // 0.0005 of 0.0015 is a 33% ratio but within 0.001
        let t = Thresholds::default();
        assert!(classify(trx("0.0005"), trx("0.0015"), &t).is_complete());
    }

    #[test]
    fn dust_is_silent() {
        let t = Thresholds::default();
        assert_eq!(classify(Sun(1_000), trx("10"), &t), Classification::Underpaid { remaining: trx("9.999"), notify: false });
        assert_eq!(classify(Sun::ZERO, trx("10"), &t), Classification::Waiting);
    }

    #[test]
    fn ratio_from_decimal() {
        let t = Thresholds::from_ratio("0.95".parse().unwrap(), Sun(1_000)).unwrap();
        assert_eq!(t, Thresholds::default());
        assert_eq!(t.ratio(), "0.95".parse::<Decimal>().unwrap());
        assert!(Thresholds::from_ratio("-1".parse().unwrap(), Sun::ZERO).is_none());
    }
}
