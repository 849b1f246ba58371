//! # Currency Conversion
//!
//! Settlement never converts: a sale settles in the currency it was paid in.
//! Conversion only happens afterwards, when amounts from different sales are
//! aggregated into one reporting currency.
//!
//! ## Rate Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base = USD                                                             │
//! │                                                                         │
//! │  KZ   →  912_500_000   (1 USD = 912.5 KZ,  stored in millionths)       │
//! │  EUR  →      920_000   (1 USD = 0.92 EUR)                              │
//! │  USD  →    1_000_000   (implicit)                                      │
//! │                                                                         │
//! │  convert(m, from → to) = m × rate[to] / rate[from], rounded half-up    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::currency::Currency;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{round_half_up, Money};

/// Rates are stored in millionths of a unit.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// Anything that can turn money in one currency into another.
pub trait CurrencyConverter {
    /// Converts `money` into `to`. Converting into the same currency is the
    /// identity and never fails.
    fn convert(&self, money: Money, to: Currency) -> CoreResult<Money>;
}

/// An explicit table of exchange rates against a base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRates {
    base: Currency,
    /// Units of the keyed currency per unit of `base`, in millionths.
    rates: BTreeMap<Currency, u64>,
}

impl ExchangeRates {
    /// A table holding only the base currency.
    pub fn new(base: Currency) -> Self {
        ExchangeRates {
            base,
            rates: BTreeMap::new(),
        }
    }

    /// Sets how many millionths of `currency` one unit of the base buys.
    pub fn with_rate(mut self, currency: Currency, micros: u64) -> Result<Self, ValidationError> {
        if micros == 0 || micros > i64::MAX as u64 {
            return Err(ValidationError::OutOfRange {
                field: format!("{} exchange rate", currency),
                min: 1,
                max: i64::MAX,
            });
        }
        if currency != self.base {
            self.rates.insert(currency, micros);
        }
        Ok(self)
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    fn micros(&self, currency: Currency) -> CoreResult<u64> {
        if currency == self.base {
            return Ok(MICROS_PER_UNIT);
        }
        self.rates
            .get(&currency)
            .copied()
            .ok_or_else(|| CoreError::UnknownCurrency(currency.code().to_string()))
    }
}

impl CurrencyConverter for ExchangeRates {
    fn convert(&self, money: Money, to: Currency) -> CoreResult<Money> {
        let from = money.currency();
        if from == to {
            return Ok(money);
        }

        let from_micros = self.micros(from)? as i128;
        let to_micros = self.micros(to)? as i128;
        let converted = round_half_up(money.minor() as i128 * to_micros, from_micros);
        let minor = i64::try_from(converted).map_err(|_| CoreError::InvalidAmount {
            reason: format!("{} does not fit after conversion to {}", money, to),
        })?;
        Ok(Money::new(minor, to))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> ExchangeRates {
        ExchangeRates::new(Currency::USD)
            .with_rate(Currency::KZ, 912_500_000)
            .unwrap()
            .with_rate(Currency::EUR, 920_000)
            .unwrap()
    }

    #[test]
    fn test_identity_needs_no_rate() {
        let empty = ExchangeRates::new(Currency::USD);
        let mzn = Money::new(12345, Currency::MZN);
        assert_eq!(empty.convert(mzn, Currency::MZN).unwrap(), mzn);
    }

    #[test]
    fn test_to_and_from_base() {
        let rates = rates();
        // $10.00 → 9125.00 Kz
        assert_eq!(
            rates.convert(Money::new(1000, Currency::USD), Currency::KZ).unwrap(),
            Money::new(912_500, Currency::KZ)
        );
        // 100.00 Kz → $0.1096 → 11 cents
        assert_eq!(
            rates.convert(Money::new(10000, Currency::KZ), Currency::USD).unwrap(),
            Money::new(11, Currency::USD)
        );
    }

    #[test]
    fn test_cross_rate() {
        // €9.20 → $10.00 → 9125.00 Kz
        assert_eq!(
            rates().convert(Money::new(920, Currency::EUR), Currency::KZ).unwrap(),
            Money::new(912_500, Currency::KZ)
        );
    }

    #[test]
    fn test_missing_rate() {
        let err = rates()
            .convert(Money::new(100, Currency::MZN), Currency::USD)
            .unwrap_err();
        assert_eq!(err, CoreError::UnknownCurrency("MZN".to_string()));
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(ExchangeRates::new(Currency::USD)
            .with_rate(Currency::KZ, 0)
            .is_err());
    }
}
