//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    10000 × 0.0899 = 898.9999999999999  ❌ WRONG!                        │
//! │                                                                         │
//! │  A dashboard preview that floors that shows 898 Kz of fees while the   │
//! │  ledger posts 899. Producer and platform disagree by one cêntimo.      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + basis points                       │
//! │    (10000 × 899 + 5000) / 10000 = 899 minor units                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use splitpay_core::currency::Currency;
//! use splitpay_core::money::Money;
//! use splitpay_core::rate::Rate;
//!
//! let gross = Money::new(10000, Currency::KZ); // 100.00 Kz
//! let fee = gross.multiply_by_percent(Rate::from_bps(899));
//! assert_eq!(fee.minor(), 899);
//!
//! let net = gross.subtract(fee).unwrap();
//! assert_eq!(net.minor(), 9101);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::currency::Currency;
use crate::error::{CoreError, CoreResult};
use crate::fraction::RefundFraction;
use crate::rate::{Rate, BPS_PER_WHOLE};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest unit of its currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values show up as reversal debits in reports
/// - **Currency tag**: two amounts only combine when their currencies match;
///   conversion is a separate step ([`crate::conversion`])
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Checkout gross ──► platform fee ──► net ──► co-producer / affiliate   │
/// │                                         └──► producer (remainder)       │
/// │                                                                         │
/// │  Refund ──► reversal debits per share (same currency as the sale)      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money {
    /// Amount in minor units (cêntimos, cents, centavos).
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use splitpay_core::currency::Currency;
    /// use splitpay_core::money::Money;
    ///
    /// let price = Money::new(1099, Currency::USD); // $10.99
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn new(minor: i64, currency: Currency) -> Self {
        Money {
            amount: minor,
            currency,
        }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        Money::new(0, currency)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.amount
    }

    /// Returns the currency tag.
    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.amount > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.amount < 0
    }

    /// Checks whether both values carry the same currency.
    #[inline]
    pub fn is_same_currency(&self, other: &Money) -> bool {
        self.currency == other.currency
    }

    /// Fails with `CurrencyMismatch` unless both values share a currency.
    pub fn ensure_same_currency(&self, other: &Money) -> CoreResult<()> {
        if self.is_same_currency(other) {
            Ok(())
        } else {
            Err(CoreError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }

    /// Adds two amounts of the same currency.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: Money) -> CoreResult<Money> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| overflow("addition"))?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtracts `other` from `self`; both must share a currency.
    pub fn subtract(self, other: Money) -> CoreResult<Money> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| overflow("subtraction"))?;
        Ok(Money::new(amount, self.currency))
    }

    /// Sums amounts that must all be in `currency`.
    ///
    /// An empty iterator sums to zero in `currency`.
    pub fn sum<I>(currency: Currency, amounts: I) -> CoreResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.add(m))
    }

    /// Takes a percentage of this amount, rounded half-up to the minor unit.
    ///
    /// ## Implementation
    /// Integer math in i128: `amount × bps / 10000` with half-up rounding.
    /// No intermediate value is ever a float.
    ///
    /// ## Example
    /// ```rust
    /// use splitpay_core::currency::Currency;
    /// use splitpay_core::money::Money;
    /// use splitpay_core::rate::Rate;
    ///
    /// let net = Money::new(9101, Currency::KZ);
    /// // 9101 × 30% = 2730.3 → 2730
    /// assert_eq!(net.multiply_by_percent(Rate::from_bps(3000)).minor(), 2730);
    ///
    /// // 5 × 10% = 0.5 → 1 (half rounds up)
    /// let tiny = Money::new(5, Currency::KZ);
    /// assert_eq!(tiny.multiply_by_percent(Rate::from_bps(1000)).minor(), 1);
    /// ```
    pub fn multiply_by_percent(&self, rate: Rate) -> Money {
        let scaled = self.amount as i128 * rate.bps() as i128;
        Money::new(
            round_half_up(scaled, BPS_PER_WHOLE as i128) as i64,
            self.currency,
        )
    }

    /// Takes an exact fraction of this amount, rounded half-up.
    ///
    /// The result never exceeds `self` in magnitude because the fraction is
    /// at most one.
    pub fn multiply_by_fraction(&self, fraction: &RefundFraction) -> Money {
        let scaled = self.amount as i128 * fraction.numerator() as i128;
        Money::new(
            round_half_up(scaled, fraction.denominator() as i128) as i64,
            self.currency,
        )
    }
}

/// Integer division rounding half away from zero. `den` must be positive.
pub(crate) fn round_half_up(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((-2 * num + den) / (2 * den))
    }
}

fn overflow(op: &str) -> CoreError {
    CoreError::InvalidAmount {
        reason: format!("{} overflows the amount range", op),
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount with its currency code, e.g. `KZ 100.00`.
///
/// ## Note
/// This is for logs and debugging. The dashboard formats with locale rules.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_major = self.currency.minor_per_major();
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(
            f,
            "{}{} {}.{:0width$}",
            sign,
            self.currency,
            abs / per_major as u64,
            abs % per_major as u64,
            width = self.currency.minor_digits() as usize
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
