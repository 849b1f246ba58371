//! # Revenue Reports
//!
//! Aggregates settlements and reversals into one reporting currency for the
//! seller dashboard.
//!
//! ## Totals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gross          Σ settlement gross                                      │
//! │  refunded       Σ reversal refunded                                     │
//! │  platform_fee   Σ settlement fee  − Σ reversal fee                      │
//! │  per role       credited (settlements) − debited (reversals)            │
//! │                                                                         │
//! │  Single currency: gross − refunded == platform_fee + Σ role net         │
//! │  Mixed currency:  every amount converted on its own, so the identity    │
//! │                   can be off by the conversion rounding                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::conversion::CurrencyConverter;
use crate::currency::Currency;
use crate::error::CoreResult;
use crate::ledger::Role;
use crate::money::Money;
use crate::reversal::ReversalRecord;
use crate::settlement::{SettlementRecord, Share};

/// What one role earned and gave back over the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoleTotals {
    pub credited: Money,
    pub debited: Money,
    /// Credited minus debited.
    pub net: Money,
}

impl RoleTotals {
    fn zero(currency: Currency) -> Self {
        RoleTotals {
            credited: Money::zero(currency),
            debited: Money::zero(currency),
            net: Money::zero(currency),
        }
    }
}

/// Revenue over a set of sales, in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RevenueReport {
    pub currency: Currency,
    pub sales: usize,
    pub refunds: usize,
    pub gross: Money,
    pub refunded: Money,
    /// Fees kept after reversals.
    pub platform_fee: Money,
    pub by_role: BTreeMap<Role, RoleTotals>,
}

impl RevenueReport {
    /// Builds a report, converting every amount into `currency`.
    pub fn build(
        settlements: &[SettlementRecord],
        reversals: &[ReversalRecord],
        converter: &dyn CurrencyConverter,
        currency: Currency,
    ) -> CoreResult<Self> {
        let zero = Money::zero(currency);
        let mut report = RevenueReport {
            currency,
            sales: settlements.len(),
            refunds: reversals.len(),
            gross: zero,
            refunded: zero,
            platform_fee: zero,
            by_role: BTreeMap::new(),
        };
        let convert = |m: Money| converter.convert(m, currency);

        for record in settlements {
            report.gross = report.gross.add(convert(record.gross)?)?;
            report.platform_fee = report.platform_fee.add(convert(record.platform_fee)?)?;
            report.credit(&record.shares, &convert)?;
        }

        for reversal in reversals {
            report.refunded = report.refunded.add(convert(reversal.refunded)?)?;
            report.platform_fee = report.platform_fee.subtract(convert(reversal.platform_fee)?)?;
            report.debit(&reversal.shares, &convert)?;
        }

        Ok(report)
    }

    /// Totals for `role`, zero when the role never appeared.
    pub fn role(&self, role: Role) -> RoleTotals {
        self.by_role
            .get(&role)
            .copied()
            .unwrap_or_else(|| RoleTotals::zero(self.currency))
    }

    /// Σ role net: what left the platform for sellers and partners.
    pub fn payouts(&self) -> CoreResult<Money> {
        Money::sum(self.currency, self.by_role.values().map(|t| t.net))
    }

    fn credit(
        &mut self,
        shares: &[Share],
        convert: &impl Fn(Money) -> CoreResult<Money>,
    ) -> CoreResult<()> {
        for share in shares {
            let amount = convert(share.amount)?;
            let totals = self.entry(share.role);
            totals.credited = totals.credited.add(amount)?;
            totals.net = totals.net.add(amount)?;
        }
        Ok(())
    }

    fn debit(
        &mut self,
        shares: &[Share],
        convert: &impl Fn(Money) -> CoreResult<Money>,
    ) -> CoreResult<()> {
        for share in shares {
            let amount = convert(share.amount)?;
            let totals = self.entry(share.role);
            totals.debited = totals.debited.add(amount)?;
            totals.net = totals.net.subtract(amount)?;
        }
        Ok(())
    }

    fn entry(&mut self, role: Role) -> &mut RoleTotals {
        let currency = self.currency;
        self.by_role
            .entry(role)
            .or_insert_with(|| RoleTotals::zero(currency))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ExchangeRates;
    use crate::fee_schedule::FeeSchedule;
    use crate::fraction::RefundFraction;
    use crate::ledger::{Participant, ParticipantLedger};
    use crate::rate::Rate;
    use crate::reversal::reverse;
    use crate::settlement::settle;

    fn co_produced() -> ParticipantLedger {
        ParticipantLedger::new(vec![Participant::co_producer(Rate::from_bps(3000))]).unwrap()
    }

    #[test]
    fn test_single_currency_report_balances() {
        let fees = FeeSchedule::default();
        let first = settle(Money::new(10000, Currency::KZ), &fees, &co_produced()).unwrap();
        let second = settle(Money::new(5000, Currency::KZ), &fees, &ParticipantLedger::producer_only()).unwrap();
        let refund = reverse(&first, RefundFraction::new(1, 2).unwrap()).unwrap();

        let report = RevenueReport::build(
            &[first, second],
            &[refund],
            &ExchangeRates::new(Currency::KZ),
            Currency::KZ,
        )
        .unwrap();

        assert_eq!(report.sales, 2);
        assert_eq!(report.refunds, 1);
        assert_eq!(report.gross.minor(), 15000);
        assert_eq!(report.refunded.minor(), 5000);
        // 899 + 450 (5000 × 8.99% = 449.5) − 450 refunded fee
        assert_eq!(report.platform_fee.minor(), 899);

        let co = report.role(Role::CoProducer);
        assert_eq!(co.credited.minor(), 2730);
        assert_eq!(co.debited.minor(), 1365);
        assert_eq!(co.net.minor(), 1365);
        assert_eq!(report.role(Role::Affiliate).net.minor(), 0);

        let payouts = report.payouts().unwrap();
        assert_eq!(
            report.gross.minor() - report.refunded.minor(),
            report.platform_fee.minor() + payouts.minor()
        );
    }

    #[test]
    fn test_mixed_currencies_are_converted() {
        let fees = FeeSchedule::default();
        let kz = settle(Money::new(912_500, Currency::KZ), &fees, &ParticipantLedger::producer_only()).unwrap();
        let usd = settle(Money::new(1000, Currency::USD), &fees, &ParticipantLedger::producer_only()).unwrap();
        let rates = ExchangeRates::new(Currency::USD)
            .with_rate(Currency::KZ, 912_500_000)
            .unwrap();

        let report = RevenueReport::build(&[kz, usd], &[], &rates, Currency::USD).unwrap();
        assert_eq!(report.gross, Money::new(2000, Currency::USD));
    }

    #[test]
    fn test_missing_rate_fails() {
        let fees = FeeSchedule::default();
        let mzn = settle(Money::new(1000, Currency::MZN), &fees, &ParticipantLedger::producer_only()).unwrap();
        assert!(RevenueReport::build(&[mzn], &[], &ExchangeRates::new(Currency::USD), Currency::USD).is_err());
    }
}
