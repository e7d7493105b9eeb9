use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// A bill amount held as a decimal so page and document totals don't drift
/// the way summed `f64`s do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Non-finite input (NaN, ±inf) maps to zero.
    pub fn from_f64(value: f64) -> Self {
        Amount(Decimal::from_f64(value).unwrap_or(Decimal::ZERO))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Amount(decimal)
    }

    pub fn zero() -> Self {
        Amount(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Rounded to cents, the precision every reported amount uses.
    pub fn rounded(self) -> Self {
        Amount(self.0.round_dp(2))
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

/// Round a float to two decimal places through `Decimal`.
pub fn round_money(value: f64) -> f64 {
    Amount::from_f64(value).rounded().to_f64()
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Amount(self.0 - rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |a, b| a + b)
    }
}
