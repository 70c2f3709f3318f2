//! # Money Module
//!
//! Provides the `Money` and `Rate` types for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In binary floating point:                                              │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Tax math multiplies large VND amounts by fractional rates:            │
//! │    37,500,000 × 0.25 summed over brackets must be exact                │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal end-to-end                                  │
//! │    Intermediate values keep full precision                             │
//! │    Rounding happens ONCE, when a result record is finalized            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use agritax_core::money::{Money, Rate};
//! use rust_decimal::Decimal;
//!
//! let gross = Money::from_units(10_000_000);
//! let rate = Rate::from_percent(Decimal::from(20));
//!
//! let tax = gross.apply_rate(rate);
//! assert_eq!(tax, Money::from_units(2_000_000));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in whole currency units (VND), backed by a decimal.
///
/// ## Design Decisions
/// - **Decimal, not i64**: intermediate products like `gross × 0.105` keep
///   their fractional part until the final rounding step
/// - **Signed**: accounting profit and taxable income can be negative
/// - **Serialized as a string**: no JSON number precision loss
///
/// ## Where Rounding Happens
/// ```text
/// bracket 1 ──┐
/// bracket 2 ──┼── Σ (full precision) ──► round_currency() ──► PitResult.pit_amount
/// bracket 3 ──┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(#[ts(as = "String")] Decimal);

impl Money {
    /// Zero money value.
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wraps a decimal amount.
    #[inline]
    pub const fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Creates a Money value from whole currency units.
    ///
    /// ## Example
    /// ```rust
    /// use agritax_core::money::Money;
    ///
    /// let deduction = Money::from_units(11_000_000);
    /// assert_eq!(deduction.to_string(), "11000000");
    /// ```
    #[inline]
    pub fn from_units(units: i64) -> Self {
        Money(Decimal::from(units))
    }

    /// Returns the underlying decimal amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() {
            Money::ZERO
        } else {
            self
        }
    }

    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self <= other {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn max(self, other: Money) -> Money {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Multiplies the amount by a rate, keeping full precision.
    ///
    /// ## Example
    /// ```rust
    /// use agritax_core::money::{Money, Rate};
    /// use rust_decimal::Decimal;
    ///
    /// let base = Money::from_units(1_000_001);
    /// let rate = Rate::from_percent(Decimal::from(5));
    ///
    /// // Not rounded yet: 50000.05
    /// assert_eq!(base.apply_rate(rate).to_string(), "50000.05");
    /// ```
    #[inline]
    pub fn apply_rate(&self, rate: Rate) -> Money {
        Money(self.0 * rate.fraction())
    }

    /// Rounds to whole currency units, half-up (midpoint away from zero).
    ///
    /// ## Only At Output Boundaries
    /// Call this when a result record is finalized, never between steps.
    ///
    /// ## Example
    /// ```rust
    /// use agritax_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let m = Money::new(Decimal::new(25, 1)); // 2.5
    /// assert_eq!(m.round_currency(), Money::from_units(3));
    ///
    /// let m = Money::new(Decimal::new(-25, 1)); // -2.5
    /// assert_eq!(m.round_currency(), Money::from_units(-3));
    /// ```
    #[inline]
    pub fn round_currency(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .normalize(),
        )
    }

    /// Checks whether the amount carries no fractional currency units.
    #[inline]
    pub fn is_integral(&self) -> bool {
        self.0.fract().is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Money)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: format!("'{}' is not a decimal number", s),
            })
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a count (dependents, attendees).
impl Mul<u32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: u32) -> Self {
        Money(self.0 * Decimal::from(count))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A tax rate stored as a fraction (0.20 = 20%).
///
/// ## Why Percent In Rules?
/// Rule values are authored as percentages (`20` means 20%), matching the
/// way legal texts state them. `Rate::from_percent` converts once at the
/// rule boundary so calculators only ever see fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Rate(#[ts(as = "String")] Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// Creates a rate from a percentage value (`10` = 10%).
    #[inline]
    pub fn from_percent(percent: Decimal) -> Self {
        Rate(percent / Decimal::ONE_HUNDRED)
    }

    /// Creates a rate from a fraction (`0.1` = 10%).
    #[inline]
    pub const fn from_fraction(fraction: Decimal) -> Self {
        Rate(fraction)
    }

    #[inline]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percent(&self) -> Decimal {
        (self.0 * Decimal::ONE_HUNDRED).normalize()
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_units_and_display() {
        assert_eq!(Money::from_units(8_000_000).to_string(), "8000000");
        assert_eq!(Money::from_units(-10_000_000).to_string(), "-10000000");
        assert_eq!(Money::ZERO.to_string(), "0");
    }

    #[test]
    fn test_apply_rate_keeps_precision() {
        let base = Money::from_units(1_000_001);
        let tax = base.apply_rate(Rate::from_percent(dec!(5)));
        assert_eq!(tax.amount(), dec!(50000.05));
        assert!(!tax.is_integral());
    }

    #[test]
    fn test_round_currency_half_up() {
        assert_eq!(Money::new(dec!(0.5)).round_currency(), Money::from_units(1));
        assert_eq!(Money::new(dec!(1.49)).round_currency(), Money::from_units(1));
        assert_eq!(Money::new(dec!(2.5)).round_currency(), Money::from_units(3));
        assert_eq!(Money::new(dec!(-2.5)).round_currency(), Money::from_units(-3));
        assert!(Money::new(dec!(1234.5)).round_currency().is_integral());
    }

    /// Summing 0.1 ten times must be exactly 1 (the float drift test).
    #[test]
    fn test_no_float_drift() {
        let tenth = Money::new(dec!(0.1));
        let total: Money = std::iter::repeat(tenth).take(10).sum();
        assert_eq!(total, Money::from_units(1));
    }

    #[test]
    fn test_clamp_and_min_max() {
        assert_eq!(Money::from_units(-5).clamp_non_negative(), Money::ZERO);
        assert_eq!(Money::from_units(5).clamp_non_negative(), Money::from_units(5));
        assert_eq!(
            Money::from_units(3).min(Money::from_units(7)),
            Money::from_units(3)
        );
        assert_eq!(
            Money::from_units(3).max(Money::from_units(7)),
            Money::from_units(7)
        );
    }

    #[test]
    fn test_multiply_by_count() {
        let dependent = Money::from_units(4_400_000);
        assert_eq!(dependent * 3, Money::from_units(13_200_000));
    }

    #[test]
    fn test_rate_conversions() {
        let rate = Rate::from_percent(dec!(20));
        assert_eq!(rate.fraction(), dec!(0.2));
        assert_eq!(rate.percent(), dec!(20));
        assert_eq!(rate.to_string(), "20%");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!("25000000".parse::<Money>().unwrap(), Money::from_units(25_000_000));
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&Money::from_units(42)).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
