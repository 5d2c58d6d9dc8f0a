//! Exact decimal emission amounts
//!
//! Regulatory totals cannot drift from rounding error, so every amount in the
//! crate is an `Emission` backed by `BigDecimal`. Arithmetic never touches
//! `f64`.
//!
//! ## Storage representation
//!
//! SQLite has no exact decimal column type (NUMERIC affinity silently becomes
//! REAL), so amounts are stored as scaled integers: 1 unit = 0.0001 kg.
//! This keeps `total = total + ?` an exact in-store increment.
//!
//! ```text
//! Emission("123.45")  <->  units 1_234_500
//! ```

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// Number of decimal places kept in storage (kg with 4 decimals)
pub const SCALE: i64 = 4;

/// Largest storable amount in units: 9_999_999_999.9999 kg
pub const MAX_UNITS: i64 = 99_999_999_999_999;

/// Integer digits of the largest storable amount
const MAX_INTEGER_DIGITS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("invalid decimal '{0}'")]
    Parse(String),

    #[error("{0} has more than 4 decimal places")]
    TooPrecise(String),

    #[error("{0} is outside the storable range")]
    OutOfRange(String),
}

/// Methane emission amount in kilograms
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Emission(BigDecimal);

impl Emission {
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// Rebuild an amount from its stored integer representation
    pub fn from_units(units: i64) -> Self {
        Self(BigDecimal::new(BigInt::from(units), SCALE))
    }

    /// Convert to stored integer units
    ///
    /// Fails if the amount needs more than `SCALE` decimal places or does
    /// not fit in `0..=MAX_UNITS` (negative amounts are rejected too).
    ///
    /// Magnitude and sign are checked on the digit count and exponent before
    /// anything is rescaled, so `1e40000000` is rejected without building a
    /// 40-million-digit integer.
    pub fn to_units(&self) -> Result<i64, AmountError> {
        if self.is_zero() {
            return Ok(0);
        }
        if self.is_negative() || self.integer_digits() > MAX_INTEGER_DIGITS {
            return Err(AmountError::OutOfRange(self.compact()));
        }
        if self.fractional_digits() > SCALE {
            return Err(AmountError::TooPrecise(self.compact()));
        }

        let scaled = self.0.with_scale(SCALE);
        let (digits, _) = scaled.as_bigint_and_exponent();

        match digits.to_i64() {
            Some(units) if (0..=MAX_UNITS).contains(&units) => Ok(units),
            _ => Err(AmountError::OutOfRange(self.compact())),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Significant fractional digits (trailing zeros ignored)
    pub fn fractional_digits(&self) -> i64 {
        let (_, exponent) = self.0.normalized().as_bigint_and_exponent();
        exponent.max(0)
    }

    /// Digits left of the decimal point, from digit count and exponent only
    fn integer_digits(&self) -> i64 {
        let (_, exponent) = self.0.as_bigint_and_exponent();
        i64::try_from(self.0.digits())
            .unwrap_or(i64::MAX)
            .saturating_sub(exponent)
    }

    /// Amounts with a storable shape render in full; anything else as
    /// `{mantissa}e{exponent}` so a huge exponent is never expanded
    fn compact(&self) -> String {
        if self.is_zero() {
            return Emission::zero().0.with_scale(SCALE).to_string();
        }
        if self.integer_digits() <= MAX_INTEGER_DIGITS && self.fractional_digits() <= SCALE {
            return self.0.with_scale(SCALE).to_string();
        }
        let (mantissa, exponent) = self.0.as_bigint_and_exponent();
        format!("{}e{}", mantissa, exponent.saturating_neg())
    }
}

impl Default for Emission {
    fn default() -> Self {
        Self::zero()
    }
}

impl FromStr for Emission {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s.trim())
            .map(Self)
            .map_err(|_| AmountError::Parse(s.to_string()))
    }
}

impl From<i64> for Emission {
    fn from(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl fmt::Display for Emission {
    /// Storable amounts render at the storage scale ("300.0000"); out of
    /// range or finer amounts in mantissa/exponent form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact())
    }
}

impl Add for Emission {
    type Output = Emission;

    fn add(self, rhs: Emission) -> Emission {
        Emission(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Emission> for Emission {
    type Output = Emission;

    fn add(self, rhs: &'a Emission) -> Emission {
        Emission(self.0 + &rhs.0)
    }
}

impl Sum for Emission {
    fn sum<I: Iterator<Item = Emission>>(iter: I) -> Self {
        iter.fold(Emission::zero(), |acc, e| acc + e)
    }
}

impl<'a> Sum<&'a Emission> for Emission {
    fn sum<I: Iterator<Item = &'a Emission>>(iter: I) -> Self {
        iter.fold(Emission::zero(), |acc, e| acc + e)
    }
}

impl Serialize for Emission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Accepts `"100.5"` or `100.5`; numbers are re-parsed from their shortest
/// decimal text, strings are taken verbatim
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEmission {
    Text(String),
    Number(serde_json::Number),
}

impl<'de> Deserialize<'de> for Emission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match RawEmission::deserialize(deserializer)? {
            RawEmission::Text(s) => s,
            RawEmission::Number(n) => n.to_string(),
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}
