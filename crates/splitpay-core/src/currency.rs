//! # Currency
//!
//! The currencies the storefront accepts at checkout.
//!
//! Angola (Kwanza, via Multicaixa/AppyPay reference payments), Mozambique
//! (Metical, mobile money) and card checkouts in USD and EUR.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;

/// Currency tag carried by every [`Money`](crate::money::Money) value.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
pub enum Currency {
    /// Angolan Kwanza.
    KZ,
    /// US Dollar.
    USD,
    /// Euro.
    EUR,
    /// Mozambican Metical.
    MZN,
}

impl Currency {
    /// Every currency the platform accepts.
    pub const ALL: [Currency; 4] = [Currency::KZ, Currency::USD, Currency::EUR, Currency::MZN];

    /// Returns the currency code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::KZ => "KZ",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::MZN => "MZN",
        }
    }

    /// Number of minor-unit digits (cêntimos, cents, centavos).
    pub const fn minor_digits(&self) -> u32 {
        2
    }

    /// Minor units per major unit (100 for every supported currency).
    pub const fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.minor_digits())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    /// Parses a currency code. Kwanza is accepted under its storefront code
    /// `KZ` and its ISO code `AOA`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "KZ" | "AOA" | "KWANZA" => Ok(Currency::KZ),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "MZN" => Ok(Currency::MZN),
            other => Err(CoreError::UnknownCurrency(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes() {
        assert_eq!("kz".parse::<Currency>().unwrap(), Currency::KZ);
        assert_eq!("AOA".parse::<Currency>().unwrap(), Currency::KZ);
        assert_eq!(" usd ".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!("MZN".parse::<Currency>().unwrap(), Currency::MZN);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "BRL".parse::<Currency>().unwrap_err();
        assert_eq!(err, CoreError::UnknownCurrency("BRL".to_string()));
    }

    #[test]
    fn test_display_matches_serde() {
        for currency in Currency::ALL {
            let json = serde_json::to_string(&currency).unwrap();
            assert_eq!(json, format!("\"{}\"", currency));
        }
    }
}
