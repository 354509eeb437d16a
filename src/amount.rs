//! Amount - Integer minor-unit money (sun)
//!
//! Every native amount inside the engine is a whole number of sun.
//! `Decimal` only appears at the edges (oracle prices, USD amounts, display),
//! and every conversion into sun floors so the engine never over-states a
//! balance it holds.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Sun per TRX
pub const SUN_PER_TRX: u64 = 1_000_000;

/// Decimal places of the native token
pub const TRX_DECIMALS: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Negative amount: {0}")]
    Negative(Decimal),

    #[error("Amount out of range: {0}")]
    Overflow(Decimal),
}

/// Native token amount in sun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sun(pub u64);

impl Sun {
    pub const ZERO: Sun = Sun(0);

    pub fn new(sun: u64) -> Self { Self(sun) }
    pub fn as_u64(self) -> u64 { self.0 }
    pub fn is_zero(self) -> bool { self.0 == 0 }

    /// Whole TRX, for tests and configuration defaults.
    pub fn from_trx_units(trx: u64) -> Self { Self(trx.saturating_mul(SUN_PER_TRX)) }

    /// Convert a display amount to sun, dropping anything below 1 sun.
    pub fn from_trx(trx: Decimal) -> Result<Self, AmountError> {
        if trx.is_sign_negative() && !trx.is_zero() {
            return Err(AmountError::Negative(trx));
        }
        let sun = trx
            .checked_mul(Decimal::from(SUN_PER_TRX))
            .ok_or(AmountError::Overflow(trx))?
            .floor();
        sun.to_u64().map(Self).ok_or(AmountError::Overflow(trx))
    }

    /// Display amount with exactly six decimals.
    pub fn to_trx(self) -> Decimal {
        Decimal::from_i128_with_scale(self.0 as i128, TRX_DECIMALS)
    }

    pub fn checked_sub(self, rhs: Sun) -> Option<Sun> { self.0.checked_sub(rhs.0).map(Sun) }
    pub fn saturating_sub(self, rhs: Sun) -> Sun { Sun(self.0.saturating_sub(rhs.0)) }
    pub fn saturating_add(self, rhs: Sun) -> Sun { Sun(self.0.saturating_add(rhs.0)) }
    pub fn abs_diff(self, rhs: Sun) -> Sun { Sun(self.0.abs_diff(rhs.0)) }
}

impl Add for Sun {
    type Output = Sun;
    fn add(self, rhs: Sun) -> Sun { self.saturating_add(rhs) }
}

impl Sub for Sun {
    type Output = Sun;
    fn sub(self, rhs: Sun) -> Sun { self.saturating_sub(rhs) }
}

impl From<u64> for Sun {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for Sun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06} TRX", self.0 / SUN_PER_TRX, self.0 % SUN_PER_TRX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    #[test]
    fn from_trx_floors_below_one_sun() {
        assert_eq!(Sun::from_trx(dec("1.2345679")).unwrap(), Sun(1_234_567));
        assert_eq!(Sun::from_trx(dec("0.0000009")).unwrap(), Sun::ZERO);
        assert_eq!(Sun::from_trx(dec("94.99")).unwrap(), Sun(94_990_000));
    }

    #[test]
    fn from_trx_rejects_negative() {
        assert!(matches!(Sun::from_trx(dec("-0.5")), Err(AmountError::Negative(_))));
    }

    #[test]
    fn to_trx_keeps_six_decimals() {
        assert_eq!(Sun(5_010_000).to_trx(), dec("5.01"));
        assert_eq!(Sun(1).to_trx().to_string(), "0.000001");
    }

    #[test]
    fn display() {
        assert_eq!(Sun(100_500_000).to_string(), "100.500000 TRX");
        assert_eq!(Sun(42).to_string(), "0.000042 TRX");
    }

    #[test]
    fn subtraction_never_wraps() {
        assert_eq!(Sun(5) - Sun(9), Sun::ZERO);
        assert_eq!(Sun(5).checked_sub(Sun(9)), None);
        assert_eq!(Sun(9).abs_diff(Sun(5)), Sun(4));
    }
}
