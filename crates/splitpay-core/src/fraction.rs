//! # Refund Fractions
//!
//! The share of a sale being refunded, as an exact ratio.
//!
//! A refund of 3333 out of 10000 is not a whole number of basis points, and
//! a binary float would drift across repeated partial refunds. Keeping the
//! ratio exact means two refunds of "half" always add up to exactly one.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::rate::BPS_PER_WHOLE;

/// An exact fraction in [0, 1], always stored in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundFraction {
    numerator: u64,
    denominator: u64,
}

impl RefundFraction {
    /// Creates a fraction `numerator / denominator`.
    ///
    /// Fails with `InvalidFraction` for a zero denominator or a value above 1.
    pub fn new(numerator: u64, denominator: u64) -> CoreResult<Self> {
        if denominator == 0 {
            return Err(CoreError::InvalidFraction {
                reason: "denominator is zero".to_string(),
            });
        }
        if numerator > denominator {
            return Err(CoreError::InvalidFraction {
                reason: format!("{}/{} is greater than 1", numerator, denominator),
            });
        }
        Ok(Self::reduced(numerator as u128, denominator as u128)
            .unwrap_or(RefundFraction { numerator, denominator }))
    }

    /// The whole sale.
    pub const fn full() -> Self {
        RefundFraction {
            numerator: 1,
            denominator: 1,
        }
    }

    /// Nothing.
    pub const fn zero() -> Self {
        RefundFraction {
            numerator: 0,
            denominator: 1,
        }
    }

    /// Creates a fraction from basis points (10000 = the whole sale).
    ///
    /// ## Example
    /// ```rust
    /// use splitpay_core::fraction::RefundFraction;
    ///
    /// let half = RefundFraction::from_bps(5000).unwrap();
    /// assert_eq!(half, RefundFraction::new(1, 2).unwrap());
    /// assert!(RefundFraction::from_bps(10001).is_err());
    /// ```
    pub fn from_bps(bps: u32) -> CoreResult<Self> {
        if bps > BPS_PER_WHOLE {
            return Err(CoreError::InvalidFraction {
                reason: format!("{} bps is more than the whole sale", bps),
            });
        }
        Self::new(bps as u64, BPS_PER_WHOLE as u64)
    }

    /// The fraction `refunded / gross`, used when the buyer is refunded a
    /// specific amount rather than a percentage.
    pub fn of_amount(refunded: Money, gross: Money) -> CoreResult<Self> {
        refunded.ensure_same_currency(&gross)?;
        if refunded.is_negative() {
            return Err(CoreError::InvalidAmount {
                reason: format!("refund amount {} is negative", refunded),
            });
        }
        if !gross.is_positive() {
            return Err(CoreError::InvalidFraction {
                reason: format!("cannot refund against gross {}", gross),
            });
        }
        Self::new(refunded.minor() as u64, gross.minor() as u64)
    }

    /// Re-checks the range invariant.
    ///
    /// Fractions that arrive through deserialization skip [`RefundFraction::new`],
    /// so the reversal calculator validates them again before use.
    pub fn validate(&self) -> CoreResult<()> {
        Self::new(self.numerator, self.denominator).map(|_| ())
    }

    /// Numerator in lowest terms.
    #[inline]
    pub const fn numerator(&self) -> u64 {
        self.numerator
    }

    /// Denominator in lowest terms.
    #[inline]
    pub const fn denominator(&self) -> u64 {
        self.denominator
    }

    /// Checks if the fraction is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Checks if the fraction is the whole sale.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.numerator == self.denominator
    }

    /// Adds two fractions. Fails with `OverRefund` when the sum passes 1.
    pub fn checked_add(&self, other: &RefundFraction) -> CoreResult<RefundFraction> {
        let num = self.numerator as u128 * other.denominator as u128
            + other.numerator as u128 * self.denominator as u128;
        let den = self.denominator as u128 * other.denominator as u128;

        if num > den {
            return Err(CoreError::OverRefund {
                requested_bps: other.to_bps_ceil(),
                remaining_bps: self.complement().to_bps_floor(),
            });
        }

        Self::reduced(num, den).ok_or_else(|| CoreError::InvalidFraction {
            reason: "refund history too fine-grained to track exactly".to_string(),
        })
    }

    /// `1 - self`.
    pub fn complement(&self) -> RefundFraction {
        let numerator = self.denominator - self.numerator;
        Self::reduced(numerator as u128, self.denominator as u128).unwrap_or(RefundFraction {
            numerator,
            denominator: self.denominator,
        })
    }

    /// Basis points, rounded down (for messages and reports).
    pub fn to_bps_floor(&self) -> u32 {
        (self.numerator as u128 * BPS_PER_WHOLE as u128 / self.denominator as u128) as u32
    }

    /// Basis points, rounded up.
    pub fn to_bps_ceil(&self) -> u32 {
        let scaled = self.numerator as u128 * BPS_PER_WHOLE as u128;
        let den = self.denominator as u128;
        ((scaled + den - 1) / den) as u32
    }

    /// Lowest terms, or `None` if they do not fit in u64.
    fn reduced(num: u128, den: u128) -> Option<Self> {
        if num == 0 {
            return Some(Self::zero());
        }
        let g = gcd(num, den);
        Some(RefundFraction {
            numerator: u64::try_from(num / g).ok()?,
            denominator: u64::try_from(den / g).ok()?,
        })
    }
}

impl Default for RefundFraction {
    fn default() -> Self {
        RefundFraction::zero()
    }
}

impl PartialOrd for RefundFraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RefundFraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as u128 * other.denominator as u128;
        let rhs = other.numerator as u128 * self.denominator as u128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for RefundFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;

    #[test]
    fn test_lowest_terms() {
        let f = RefundFraction::new(2500, 10000).unwrap();
        assert_eq!(f.numerator(), 1);
        assert_eq!(f.denominator(), 4);
        assert_eq!(RefundFraction::new(0, 7).unwrap(), RefundFraction::zero());
        assert!(RefundFraction::new(7, 7).unwrap().is_full());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            RefundFraction::new(3, 2),
            Err(CoreError::InvalidFraction { .. })
        ));
        assert!(matches!(
            RefundFraction::new(1, 0),
            Err(CoreError::InvalidFraction { .. })
        ));
    }

    #[test]
    fn test_of_amount() {
        let gross = Money::new(10000, Currency::KZ);
        let f = RefundFraction::of_amount(Money::new(3333, Currency::KZ), gross).unwrap();
        assert_eq!(f, RefundFraction::new(3333, 10000).unwrap());

        let err = RefundFraction::of_amount(Money::new(1, Currency::USD), gross).unwrap_err();
        assert!(matches!(err, CoreError::CurrencyMismatch { .. }));

        let err = RefundFraction::of_amount(Money::new(10001, Currency::KZ), gross).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFraction { .. }));
    }

    #[test]
    fn test_checked_add() {
        let third = RefundFraction::new(1, 3).unwrap();
        let two_thirds = third.checked_add(&third).unwrap();
        assert_eq!(two_thirds, RefundFraction::new(2, 3).unwrap());
        assert!(two_thirds.checked_add(&third).unwrap().is_full());

        let err = two_thirds
            .checked_add(&RefundFraction::from_bps(5000).unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::OverRefund {
                requested_bps: 5000,
                remaining_bps: 3333
            }
        );
    }

    #[test]
    fn test_validate_deserialized() {
        let bad: RefundFraction =
            serde_json::from_str(r#"{"numerator":5,"denominator":4}"#).unwrap();
        assert!(matches!(bad.validate(), Err(CoreError::InvalidFraction { .. })));
        assert!(RefundFraction::full().validate().is_ok());
    }

    #[test]
    fn test_ordering_and_complement() {
        let quarter = RefundFraction::from_bps(2500).unwrap();
        let half = RefundFraction::from_bps(5000).unwrap();
        assert!(quarter < half);
        assert_eq!(quarter.complement(), RefundFraction::new(3, 4).unwrap());
        assert_eq!(RefundFraction::full().complement(), RefundFraction::zero());
    }
}
