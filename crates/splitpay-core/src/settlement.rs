//! # Settlement Calculator
//!
//! Splits a completed sale between the platform, the producer and an
//! optional co-producer or affiliate.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gross 10000 KZ                                                         │
//! │     │                                                                   │
//! │     ├── take rate 8.99% ──► platform fee   899   (rounded half-up)      │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  net 9101                                                               │
//! │     │                                                                   │
//! │     ├── co-producer 30% ──► 2730                 (rounded half-up)      │
//! │     │                                                                   │
//! │     └── producer ─────────► 9101 − 2730 = 6371   (remainder)            │
//! │                                                                         │
//! │  899 + 2730 + 6371 = 10000 ✓                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The fee is always taken **before** the commission split, and the producer
//! share is always a subtraction, never a percentage of its own. That
//! subtraction is what makes the record conserve the gross exactly: every
//! cêntimo of rounding slack lands on the producer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::fee_schedule::FeeSchedule;
use crate::ledger::{ParticipantLedger, Role};
use crate::money::Money;
use crate::rate::Rate;

// =============================================================================
// Records
// =============================================================================

/// One participant's portion of a settlement or reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Share {
    pub role: Role,

    /// Account credited (or debited, on reversal).
    pub party_id: Option<String>,

    /// Commission the share was computed with. Zero for the producer, whose
    /// share is the remainder.
    pub commission: Rate,

    pub amount: Money,
}

/// The immutable outcome of settling one sale.
///
/// ## Invariant
/// `platform_fee + Σ shares.amount == gross`, exactly, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettlementRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Order this settlement belongs to, when settled through checkout.
    pub order_id: Option<String>,

    pub gross: Money,

    /// Take rate resolved from the fee schedule at settlement time.
    pub take_rate: Rate,

    pub platform_fee: Money,

    /// Gross minus platform fee.
    pub net: Money,

    /// Producer first, then co-producer / affiliate in ledger order.
    pub shares: Vec<Share>,
}

impl SettlementRecord {
    /// Share for `role`, if the role took part in the sale.
    pub fn share(&self, role: Role) -> Option<&Share> {
        self.shares.iter().find(|s| s.role == role)
    }

    /// Amount for `role`, zero in the sale currency when absent.
    pub fn amount_for(&self, role: Role) -> Money {
        self.share(role)
            .map(|s| s.amount)
            .unwrap_or_else(|| Money::zero(self.gross.currency()))
    }

    /// The producer's share (always present).
    pub fn producer_share(&self) -> Money {
        self.amount_for(Role::Producer)
    }

    /// Re-checks the conservation invariant.
    ///
    /// Used after deserializing a stored record, before it feeds a reversal.
    pub fn verify(&self) -> CoreResult<()> {
        let currency = self.gross.currency();
        let amounts = self.shares.iter().map(|s| s.amount);

        let net = self.gross.subtract(self.platform_fee)?;
        if net != self.net {
            return Err(CoreError::InvalidAmount {
                reason: format!(
                    "settlement {} net {} is not gross {} minus fee {}",
                    self.id, self.net, self.gross, self.platform_fee
                ),
            });
        }

        let distributed = Money::sum(currency, amounts)?;
        if distributed != self.net {
            return Err(CoreError::InvalidAmount {
                reason: format!(
                    "settlement {} shares total {}, expected {}",
                    self.id, distributed, self.net
                ),
            });
        }

        if let Some(share) = self.shares.iter().find(|s| s.amount.is_negative()) {
            return Err(CoreError::InvalidAmount {
                reason: format!("settlement {} has negative {} share", self.id, share.role),
            });
        }

        if self.share(Role::Producer).is_none() {
            return Err(ValidationError::Required {
                field: "producer share".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Settles a sale.
///
/// ## Errors
/// - `InvalidAmount` for a negative gross
/// - `UnknownCurrency` when the schedule has no entry for the sale currency
///
/// ## Example
/// ```rust
/// use splitpay_core::currency::Currency;
/// use splitpay_core::fee_schedule::FeeSchedule;
/// use splitpay_core::ledger::{Participant, ParticipantLedger, Role};
/// use splitpay_core::money::Money;
/// use splitpay_core::rate::Rate;
/// use splitpay_core::settlement::settle;
///
/// let ledger = ParticipantLedger::new(vec![
///     Participant::co_producer(Rate::from_bps(3000)),
/// ]).unwrap();
/// let record = settle(Money::new(10000, Currency::KZ), &FeeSchedule::default(), &ledger).unwrap();
///
/// assert_eq!(record.platform_fee.minor(), 899);
/// assert_eq!(record.amount_for(Role::CoProducer).minor(), 2730);
/// assert_eq!(record.producer_share().minor(), 6371);
/// ```
pub fn settle(
    gross: Money,
    schedule: &FeeSchedule,
    ledger: &ParticipantLedger,
) -> CoreResult<SettlementRecord> {
    if gross.is_negative() {
        return Err(CoreError::InvalidAmount {
            reason: format!("gross {} is negative", gross),
        });
    }

    let currency = gross.currency();
    let take_rate = schedule.resolve(currency)?;
    let platform_fee = gross.multiply_by_percent(take_rate);
    let net = gross.subtract(platform_fee)?;

    let mut sharer_shares = Vec::new();
    let mut distributed = Money::zero(currency);
    for participant in ledger.revenue_sharers() {
        let amount = net.multiply_by_percent(participant.commission);
        distributed = distributed.add(amount)?;
        sharer_shares.push(Share {
            role: participant.role,
            party_id: participant.party_id.clone(),
            commission: participant.commission,
            amount,
        });
    }

    let producer_amount = net.subtract(distributed)?;
    if producer_amount.is_negative() {
        return Err(ValidationError::CommissionOverflow {
            total_bps: ledger.total_commission().bps(),
        }
        .into());
    }

    let mut shares = Vec::with_capacity(sharer_shares.len() + 1);
    shares.push(Share {
        role: Role::Producer,
        party_id: ledger.producer_party().map(str::to_string),
        commission: Rate::zero(),
        amount: producer_amount,
    });
    shares.extend(sharer_shares);

    Ok(SettlementRecord {
        id: Uuid::new_v4().to_string(),
        order_id: None,
        gross,
        take_rate,
        platform_fee,
        net,
        shares,
    })
}

/// Settles a sale on behalf of a checkout order.
///
/// Same computation as [`settle`]; the order id is stamped on the record so
/// the persistence layer can enforce one settlement per order.
pub fn settle_order(
    order_id: &str,
    gross: Money,
    schedule: &FeeSchedule,
    ledger: &ParticipantLedger,
) -> CoreResult<SettlementRecord> {
    let order_id = order_id.trim();
    if order_id.is_empty() {
        return Err(ValidationError::Required {
            field: "order id".to_string(),
        }
        .into());
    }

    let mut record = settle(gross, schedule, ledger)?;
    record.order_id = Some(order_id.to_string());
    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::ledger::Participant;
    use proptest::prelude::*;

    fn kz(minor: i64) -> Money {
        Money::new(minor, Currency::KZ)
    }

    fn ledger(participants: Vec<Participant>) -> ParticipantLedger {
        ParticipantLedger::new(participants).unwrap()
    }

    #[test]
    fn test_co_producer_worked_example() {
        let record = settle(
            kz(10000),
            &FeeSchedule::default(),
            &ledger(vec![Participant::co_producer(Rate::from_bps(3000))]),
        )
        .unwrap();

        assert_eq!(record.take_rate, Rate::from_bps(899));
        assert_eq!(record.platform_fee, kz(899));
        assert_eq!(record.net, kz(9101));
        assert_eq!(record.amount_for(Role::CoProducer), kz(2730));
        assert_eq!(record.producer_share(), kz(6371));
        assert!(record.verify().is_ok());
    }

    #[test]
    fn test_producer_only() {
        let record = settle(kz(10000), &FeeSchedule::default(), &ParticipantLedger::producer_only())
            .unwrap();

        assert_eq!(record.platform_fee, kz(899));
        assert_eq!(record.producer_share(), kz(9101));
        assert_eq!(record.shares.len(), 1);
        assert!(record.share(Role::Affiliate).is_none());
    }

    #[test]
    fn test_zero_commission_participant_is_present() {
        let record = settle(
            kz(10000),
            &FeeSchedule::default(),
            &ledger(vec![Participant::affiliate(Rate::zero())]),
        )
        .unwrap();

        let affiliate = record.share(Role::Affiliate).unwrap();
        assert_eq!(affiliate.amount, kz(0));
        assert_eq!(record.producer_share(), kz(9101));
    }

    #[test]
    fn test_full_commission_leaves_producer_at_zero() {
        let record = settle(
            kz(10000),
            &FeeSchedule::default(),
            &ledger(vec![Participant::co_producer(Rate::full())]),
        )
        .unwrap();

        assert_eq!(record.amount_for(Role::CoProducer), kz(9101));
        assert_eq!(record.producer_share(), kz(0));
        assert!(record.verify().is_ok());
    }

    #[test]
    fn test_foreign_currency_rate() {
        let record = settle(
            Money::new(2500, Currency::USD),
            &FeeSchedule::default(),
            &ParticipantLedger::producer_only(),
        )
        .unwrap();
        // 2500 × 9.99% = 249.75 → 250
        assert_eq!(record.platform_fee.minor(), 250);
        assert_eq!(record.producer_share().minor(), 2250);
    }

    #[test]
    fn test_negative_gross_rejected() {
        let err = settle(kz(-1), &FeeSchedule::default(), &ParticipantLedger::producer_only())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount { .. }));
    }

    #[test]
    fn test_unknown_currency_rejected() {
        let schedule = FeeSchedule::empty()
            .with_rate(Currency::KZ, Rate::from_bps(899))
            .unwrap();
        let err = settle(
            Money::new(100, Currency::EUR),
            &schedule,
            &ParticipantLedger::producer_only(),
        )
        .unwrap_err();
        assert_eq!(err, CoreError::UnknownCurrency("EUR".to_string()));
    }

    #[test]
    fn test_zero_gross() {
        let record = settle(
            kz(0),
            &FeeSchedule::default(),
            &ledger(vec![Participant::affiliate(Rate::from_bps(5000))]),
        )
        .unwrap();
        assert!(record.shares.iter().all(|s| s.amount.is_zero()));
        assert!(record.platform_fee.is_zero());
    }

    #[test]
    fn test_party_ids_carried() {
        let record = settle(
            kz(10000),
            &FeeSchedule::default(),
            &ledger(vec![
                Participant::producer().with_party("seller-1"),
                Participant::affiliate(Rate::from_bps(2000)).with_party("aff-9"),
            ]),
        )
        .unwrap();

        assert_eq!(record.shares[0].role, Role::Producer);
        assert_eq!(record.shares[0].party_id.as_deref(), Some("seller-1"));
        assert_eq!(record.shares[1].party_id.as_deref(), Some("aff-9"));
    }

    #[test]
    fn test_settle_order_requires_id() {
        let ledger = ParticipantLedger::producer_only();
        assert!(settle_order(" ", kz(100), &FeeSchedule::default(), &ledger).is_err());

        let record = settle_order("ord-42", kz(100), &FeeSchedule::default(), &ledger).unwrap();
        assert_eq!(record.order_id.as_deref(), Some("ord-42"));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut record = settle(
            kz(10000),
            &FeeSchedule::default(),
            &ledger(vec![Participant::co_producer(Rate::from_bps(3000))]),
        )
        .unwrap();
        record.shares[0].amount = kz(6372);
        assert!(matches!(record.verify(), Err(CoreError::InvalidAmount { .. })));
    }

    fn arb_ledger() -> impl Strategy<Value = ParticipantLedger> {
        prop_oneof![
            Just(ParticipantLedger::producer_only()),
            (0u32..=10_000).prop_map(|bps| ledger(vec![Participant::co_producer(Rate::from_bps(bps))])),
            (0u32..=10_000).prop_map(|bps| ledger(vec![Participant::affiliate(Rate::from_bps(bps))])),
        ]
    }

    proptest! {
        #[test]
        fn prop_conservation(gross in 0i64..1_000_000_000_000, ledger in arb_ledger()) {
            let record = settle(kz(gross), &FeeSchedule::default(), &ledger).unwrap();
            let total: i64 = record.platform_fee.minor()
                + record.shares.iter().map(|s| s.amount.minor()).sum::<i64>();
            prop_assert_eq!(total, gross);
            prop_assert!(record.producer_share().minor() >= 0);
            prop_assert!(record.verify().is_ok());
        }

        #[test]
        fn prop_sharer_shares_independent_of_producer(gross in 0i64..10_000_000, bps in 0u32..=10_000) {
            let with_producer = ledger(vec![
                Participant::producer().with_party("p"),
                Participant::affiliate(Rate::from_bps(bps)),
            ]);
            let without = ledger(vec![Participant::affiliate(Rate::from_bps(bps))]);

            let a = settle(kz(gross), &FeeSchedule::default(), &with_producer).unwrap();
            let b = settle(kz(gross), &FeeSchedule::default(), &without).unwrap();
            prop_assert_eq!(a.platform_fee, b.platform_fee);
            prop_assert_eq!(a.amount_for(Role::Affiliate), b.amount_for(Role::Affiliate));
            prop_assert_eq!(
                a.amount_for(Role::Affiliate),
                a.net.multiply_by_percent(Rate::from_bps(bps))
            );
        }
    }
}
