//! # Fee Schedule
//!
//! The platform's take rate per currency.
//!
//! ## Default Table
//! ```text
//! ┌──────────┬───────────┐
//! │ Currency │ Take rate │
//! ├──────────┼───────────┤
//! │ KZ       │   8.99%   │
//! │ USD      │   9.99%   │
//! │ EUR      │   9.99%   │
//! │ MZN      │   9.99%   │
//! └──────────┴───────────┘
//! ```
//!
//! Operators may override entries through configuration, but a currency
//! without an entry is an error at settlement time, never a silent default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::currency::Currency;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::rate::{Rate, BPS_PER_WHOLE};

/// Take rate charged on Kwanza sales.
pub const DEFAULT_KZ_TAKE_RATE: Rate = Rate::from_bps(899);

/// Take rate charged on every other currency.
pub const DEFAULT_FOREIGN_TAKE_RATE: Rate = Rate::from_bps(999);

/// Maps each accepted currency to the platform's take rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Currency, Rate>", into = "BTreeMap<Currency, Rate>")]
pub struct FeeSchedule {
    rates: BTreeMap<Currency, Rate>,
}

impl FeeSchedule {
    /// A schedule with no entries. Every `resolve` fails until rates are added.
    pub fn empty() -> Self {
        FeeSchedule {
            rates: BTreeMap::new(),
        }
    }

    /// Builds a schedule from explicit entries, validating each rate.
    pub fn from_entries<I>(entries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (Currency, Rate)>,
    {
        entries
            .into_iter()
            .try_fold(FeeSchedule::empty(), |schedule, (currency, rate)| {
                schedule.with_rate(currency, rate)
            })
    }

    /// Returns a copy with `currency` charged at `rate`.
    ///
    /// ## Rules
    /// - Take rate must be in [0, 100): a 100% fee would leave nothing to split
    pub fn with_rate(mut self, currency: Currency, rate: Rate) -> CoreResult<Self> {
        if rate.bps() >= BPS_PER_WHOLE {
            return Err(ValidationError::OutOfRange {
                field: format!("take rate for {}", currency),
                min: 0,
                max: BPS_PER_WHOLE as i64 - 1,
            }
            .into());
        }
        self.rates.insert(currency, rate);
        Ok(self)
    }

    /// Looks up the take rate for `currency`.
    ///
    /// ## Example
    /// ```rust
    /// use splitpay_core::currency::Currency;
    /// use splitpay_core::fee_schedule::FeeSchedule;
    ///
    /// let schedule = FeeSchedule::default();
    /// assert_eq!(schedule.resolve(Currency::KZ).unwrap().bps(), 899);
    /// assert_eq!(schedule.resolve(Currency::EUR).unwrap().bps(), 999);
    /// ```
    pub fn resolve(&self, currency: Currency) -> CoreResult<Rate> {
        self.rates
            .get(&currency)
            .copied()
            .ok_or_else(|| CoreError::UnknownCurrency(currency.to_string()))
    }

    /// Iterates entries in currency order.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, Rate)> + '_ {
        self.rates.iter().map(|(c, r)| (*c, *r))
    }

    /// Number of configured currencies.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// True when no currency is configured.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(Currency::KZ, DEFAULT_KZ_TAKE_RATE);
        rates.insert(Currency::USD, DEFAULT_FOREIGN_TAKE_RATE);
        rates.insert(Currency::EUR, DEFAULT_FOREIGN_TAKE_RATE);
        rates.insert(Currency::MZN, DEFAULT_FOREIGN_TAKE_RATE);
        FeeSchedule { rates }
    }
}

impl TryFrom<BTreeMap<Currency, Rate>> for FeeSchedule {
    type Error = CoreError;

    fn try_from(rates: BTreeMap<Currency, Rate>) -> Result<Self, Self::Error> {
        FeeSchedule::from_entries(rates)
    }
}

impl From<FeeSchedule> for BTreeMap<Currency, Rate> {
    fn from(schedule: FeeSchedule) -> Self {
        schedule.rates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.resolve(Currency::KZ).unwrap(), Rate::from_bps(899));
        assert_eq!(schedule.resolve(Currency::USD).unwrap(), Rate::from_bps(999));
        assert_eq!(schedule.resolve(Currency::EUR).unwrap(), Rate::from_bps(999));
        assert_eq!(schedule.resolve(Currency::MZN).unwrap(), Rate::from_bps(999));
    }

    #[test]
    fn test_unknown_currency() {
        let schedule = FeeSchedule::empty()
            .with_rate(Currency::KZ, Rate::from_bps(899))
            .unwrap();
        assert_eq!(
            schedule.resolve(Currency::MZN).unwrap_err(),
            CoreError::UnknownCurrency("MZN".to_string())
        );
    }

    #[test]
    fn test_rejects_full_take_rate() {
        let err = FeeSchedule::empty()
            .with_rate(Currency::USD, Rate::full())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        assert!(FeeSchedule::empty()
            .with_rate(Currency::USD, Rate::from_bps(9999))
            .is_ok());
    }

    #[test]
    fn test_serde_validates() {
        let schedule: FeeSchedule = serde_json::from_str(r#"{"KZ": 500}"#).unwrap();
        assert_eq!(schedule.resolve(Currency::KZ).unwrap(), Rate::from_bps(500));

        assert!(serde_json::from_str::<FeeSchedule>(r#"{"KZ": 10000}"#).is_err());
    }
}
