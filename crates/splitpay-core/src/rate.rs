//! # Rates
//!
//! Percentages stored in basis points.
//!
//! ## Why Basis Points?
//! 1 basis point = 0.01% = 1/10000
//! 899 bps = 8.99% (the Kwanza take rate)
//!
//! Every percentage the storefront shows has at most two decimals, so basis
//! points represent them exactly and the settlement math stays in integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Basis points in 100%.
pub const BPS_PER_WHOLE: u32 = 10_000;

/// A percentage in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Zero percent.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// One hundred percent.
    #[inline]
    pub const fn full() -> Self {
        Rate(BPS_PER_WHOLE)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal percentage such as `"8.99"` or `"30"` exactly.
    ///
    /// ## Rules
    /// - Digits with an optional `.` and at most two fractional digits
    /// - A trailing `%` is tolerated
    /// - No sign, no exponent
    ///
    /// ## Example
    /// ```rust
    /// use splitpay_core::rate::Rate;
    ///
    /// assert_eq!(Rate::from_percent_str("8.99").unwrap().bps(), 899);
    /// assert_eq!(Rate::from_percent_str("30%").unwrap().bps(), 3000);
    /// assert!(Rate::from_percent_str("8.999").is_err());
    /// ```
    pub fn from_percent_str(input: &str) -> Result<Self, ValidationError> {
        let raw = input.trim().trim_end_matches('%').trim();
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "percentage".to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(ValidationError::Required {
                field: "percentage".to_string(),
            });
        }

        let (whole, frac) = match raw.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (raw, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number like 8.99"));
        }
        if frac.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }
        if whole.len() > 3 {
            return Err(ValidationError::OutOfRange {
                field: "percentage".to_string(),
                min: 0,
                max: 100,
            });
        }

        let whole: u32 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid("not a number"))? };
        let frac: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().map_err(|_| invalid("not a number"))? * 10,
            _ => frac.parse().map_err(|_| invalid("not a number"))?,
        };

        Ok(Rate(whole * 100 + frac))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Rate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rate::from_percent_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_percent_str() {
        assert_eq!(Rate::from_percent_str("8.99").unwrap(), Rate::from_bps(899));
        assert_eq!(Rate::from_percent_str("9.9").unwrap(), Rate::from_bps(990));
        assert_eq!(Rate::from_percent_str("100").unwrap(), Rate::full());
        assert_eq!(Rate::from_percent_str("0").unwrap(), Rate::zero());
        assert_eq!(Rate::from_percent_str(".5").unwrap(), Rate::from_bps(50));
    }

    #[test]
    fn test_from_percent_str_rejects() {
        assert!(Rate::from_percent_str("").is_err());
        assert!(Rate::from_percent_str("-1").is_err());
        assert!(Rate::from_percent_str("1e2").is_err());
        assert!(Rate::from_percent_str("8.999").is_err());
        assert!(Rate::from_percent_str(".").is_err());
        assert!(Rate::from_percent_str("1000").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Rate::from_bps(899).to_string(), "8.99%");
        assert_eq!(Rate::full().to_string(), "100.00%");
        assert_eq!(Rate::from_bps(5).to_string(), "0.05%");
    }
}
