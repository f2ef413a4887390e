//! Money value object.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg};
use std::str::FromStr;

use crate::error::{BankError, BankResult};

/// Number of fractional digits a monetary amount may carry.
pub const CENT_SCALE: u32 = 2;

/// A signed monetary amount.
///
/// Backed by an exact decimal so that balances never accumulate rounding
/// error. Serialized as a decimal string (e.g. `"300.00"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a zero Money value.
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Creates Money from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, CENT_SCALE))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount carries no more than two fractional digits.
    ///
    /// Trailing zeros do not count, so `1.500` qualifies.
    #[must_use]
    pub fn has_cent_precision(&self) -> bool {
        self.0.normalize().scale() <= CENT_SCALE
    }

    /// Adds another amount, returning `None` on decimal overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Formats the amount for display, e.g. `"$300.00"` or `"-$12.50"`.
    pub fn format(&self) -> String {
        let rounded = self.0.round_dp(CENT_SCALE).abs();
        if self.is_negative() {
            format!("-${rounded:.2}")
        } else {
            format!("${rounded:.2}")
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Returns true for a plain decimal literal: an optional `-`, one or more
/// digits, and optionally a `.` followed by one or more digits.
///
/// `Decimal::from_str` also takes exponents and `_` separators, which are
/// not valid amounts.
fn is_plain_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };

    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && fraction.map_or(true, all_digits)
}

impl FromStr for Money {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || BankError::InvalidAmount {
            value: s.to_string(),
        };

        if !is_plain_decimal(trimmed) {
            return Err(invalid());
        }
        Decimal::from_str(trimmed).map(Self).map_err(|_| invalid())
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Parses a requested transaction amount.
///
/// The amount must be an exact decimal, strictly positive, with at most
/// two fractional digits.
pub fn parse_positive_amount(raw: &str) -> BankResult<Money> {
    let amount: Money = raw.parse()?;

    if !amount.is_positive() {
        return Err(BankError::NonPositiveAmount {
            value: raw.trim().to_string(),
        });
    }

    if !amount.has_cent_precision() {
        return Err(BankError::InvalidAmount {
            value: raw.trim().to_string(),
        });
    }

    Ok(amount)
}
