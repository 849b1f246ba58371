//! # Reversal Calculator
//!
//! Unwinds a settlement, fully or partially, when the buyer is refunded.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settlement: fee 899 │ co-producer 2730 │ producer 6371 │ gross 10000   │
//! │                                                                         │
//! │  refund 1/2                                                             │
//! │     │                                                                   │
//! │     ├── buyer receives      round(10000 × 1/2) = 5000                  │
//! │     ├── platform fee debit  round(899 × 1/2)   =  450                  │
//! │     ├── co-producer debit   round(2730 × 1/2)  = 1365                  │
//! │     └── producer debit      5000 − 450 − 1365  = 3185  (remainder)     │
//! │                                                                         │
//! │  later refund 1/2 (cumulative 1)                                        │
//! │     └── every entry debits exactly what is left: 449 │ 1365 │ 3186     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Debits are computed on the **cumulative** refunded fraction and the
//! amounts already debited are subtracted, so a series of partial refunds
//! always adds up to exactly the original record once the whole sale has
//! been refunded, whatever the rounding along the way.
//!
//! The producer absorbs reversal rounding the same way it absorbs settlement
//! rounding. When that would push the producer's debit below zero or above
//! what it still holds (a producer with a zero share, for instance), the
//! slack moves to the co-producer / affiliate and then to the platform fee.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::fraction::RefundFraction;
use crate::ledger::Role;
use crate::money::Money;
use crate::settlement::{SettlementRecord, Share};

// =============================================================================
// Record
// =============================================================================

/// Debit instructions produced by one refund.
///
/// ## Invariant
/// `platform_fee + Σ shares.amount == refunded`, exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// The settlement being unwound. Never mutated by a reversal.
    pub settlement_id: String,

    pub order_id: Option<String>,

    /// Fraction refunded by this reversal.
    pub fraction: RefundFraction,

    /// Fraction refunded across this and every earlier reversal.
    pub cumulative: RefundFraction,

    /// Amount returned to the buyer.
    pub refunded: Money,

    /// Platform fee given back.
    pub platform_fee: Money,

    /// Per-participant debits, in the settlement's share order.
    pub shares: Vec<Share>,
}

impl ReversalRecord {
    /// Debit for `role`, zero when the role is absent.
    pub fn amount_for(&self, role: Role) -> Money {
        self.shares
            .iter()
            .find(|s| s.role == role)
            .map(|s| s.amount)
            .unwrap_or_else(|| Money::zero(self.refunded.currency()))
    }

    /// Re-checks the conservation invariant.
    pub fn verify(&self) -> CoreResult<()> {
        let debited = Money::sum(
            self.refunded.currency(),
            std::iter::once(self.platform_fee).chain(self.shares.iter().map(|s| s.amount)),
        )?;
        if debited != self.refunded {
            return Err(CoreError::InvalidAmount {
                reason: format!(
                    "reversal {} debits {}, refunded {}",
                    self.id, debited, self.refunded
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Reverses `fraction` of a settlement that has not been refunded before.
///
/// ## Example
/// ```rust
/// use splitpay_core::currency::Currency;
/// use splitpay_core::fee_schedule::FeeSchedule;
/// use splitpay_core::fraction::RefundFraction;
/// use splitpay_core::ledger::{Participant, ParticipantLedger, Role};
/// use splitpay_core::money::Money;
/// use splitpay_core::rate::Rate;
/// use splitpay_core::reversal::reverse;
/// use splitpay_core::settlement::settle;
///
/// let ledger = ParticipantLedger::new(vec![Participant::co_producer(Rate::from_bps(3000))]).unwrap();
/// let record = settle(Money::new(10000, Currency::KZ), &FeeSchedule::default(), &ledger).unwrap();
///
/// let reversal = reverse(&record, RefundFraction::full()).unwrap();
/// assert_eq!(reversal.platform_fee.minor(), 899);
/// assert_eq!(reversal.amount_for(Role::CoProducer).minor(), 2730);
/// assert_eq!(reversal.amount_for(Role::Producer).minor(), 6371);
/// ```
pub fn reverse(record: &SettlementRecord, fraction: RefundFraction) -> CoreResult<ReversalRecord> {
    reverse_after(record, &[], fraction)
}

/// Reverses `fraction` of a settlement, given every earlier reversal of it.
///
/// ## Errors
/// - `InvalidFraction` when `fraction` is outside [0, 1]
/// - `OverRefund` when earlier reversals plus `fraction` exceed the sale
/// - `Validation(ForeignReversal)` when `prior` holds another sale's reversal
/// - `InvalidAmount` when the settlement or history fails its invariants
pub fn reverse_after(
    record: &SettlementRecord,
    prior: &[ReversalRecord],
    fraction: RefundFraction,
) -> CoreResult<ReversalRecord> {
    fraction.validate()?;
    record.verify()?;

    for reversal in prior {
        if reversal.settlement_id != record.id {
            return Err(ValidationError::ForeignReversal {
                reversal_id: reversal.id.clone(),
                settlement_id: record.id.clone(),
            }
            .into());
        }
        reversal.fraction.validate()?;
    }

    let already_refunded = prior
        .iter()
        .try_fold(RefundFraction::zero(), |acc, r| acc.checked_add(&r.fraction))?;
    let cumulative = already_refunded.checked_add(&fraction)?;

    let mut entries = Entries::collect(record, prior);

    let target = record.gross.multiply_by_fraction(&cumulative).minor() - entries.total_already();
    if target < 0 || target > entries.total_remaining() {
        return Err(inconsistent_history(record));
    }

    // Platform fee and co-producer / affiliate: cumulative rounding.
    for entry in entries.non_absorbing_mut() {
        let due = Money::new(entry.original, record.gross.currency())
            .multiply_by_fraction(&cumulative)
            .minor();
        entry.debit = (due - entry.already).clamp(0, entry.remaining().max(0));
    }

    // Producer: whatever is left of the target.
    let wanted = target - entries.non_absorbing_debit();
    let producer = &mut entries.producer;
    producer.debit = wanted.clamp(0, producer.remaining().max(0));
    let slack = wanted - producer.debit;
    if slack != 0 && !entries.spill(slack) {
        return Err(inconsistent_history(record));
    }

    Ok(entries.into_record(record, fraction, cumulative, target))
}

fn inconsistent_history(record: &SettlementRecord) -> CoreError {
    CoreError::InvalidAmount {
        reason: format!(
            "reversal history of settlement {} does not match its shares",
            record.id
        ),
    }
}

// =============================================================================
// Working state
// =============================================================================

#[derive(Debug)]
struct Entry {
    original: i64,
    already: i64,
    debit: i64,
}

impl Entry {
    fn remaining(&self) -> i64 {
        self.original - self.already
    }
}

/// One entry per thing that can be debited: the platform fee, the producer
/// and each co-producer / affiliate share (kept in settlement share order).
#[derive(Debug)]
struct Entries {
    platform: Entry,
    producer: Entry,
    producer_index: usize,
    sharers: Vec<(usize, Entry)>,
}

impl Entries {
    fn collect(record: &SettlementRecord, prior: &[ReversalRecord]) -> Self {
        let platform = Entry {
            original: record.platform_fee.minor(),
            already: prior.iter().map(|r| r.platform_fee.minor()).sum(),
            debit: 0,
        };

        let already_for = |role: Role| -> i64 {
            prior.iter().map(|r| r.amount_for(role).minor()).sum()
        };

        let mut producer = None;
        let mut sharers = Vec::new();
        for (index, share) in record.shares.iter().enumerate() {
            let entry = Entry {
                original: share.amount.minor(),
                already: already_for(share.role),
                debit: 0,
            };
            if share.role == Role::Producer {
                producer = Some((index, entry));
            } else {
                sharers.push((index, entry));
            }
        }

        // `verify` guarantees a producer share.
        let (producer_index, producer) = producer.unwrap_or((
            record.shares.len(),
            Entry {
                original: 0,
                already: 0,
                debit: 0,
            },
        ));

        Entries {
            platform,
            producer,
            producer_index,
            sharers,
        }
    }

    fn all(&self) -> impl Iterator<Item = &Entry> {
        std::iter::once(&self.platform)
            .chain(std::iter::once(&self.producer))
            .chain(self.sharers.iter().map(|(_, e)| e))
    }

    fn total_already(&self) -> i64 {
        self.all().map(|e| e.already).sum()
    }

    fn total_remaining(&self) -> i64 {
        self.all().map(|e| e.remaining()).sum()
    }

    /// Spill order: co-producer / affiliate in ledger order, then platform fee.
    fn non_absorbing_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.sharers
            .iter_mut()
            .map(|(_, e)| e)
            .chain(std::iter::once(&mut self.platform))
    }

    fn non_absorbing_debit(&self) -> i64 {
        self.platform.debit + self.sharers.iter().map(|(_, e)| e.debit).sum::<i64>()
    }

    /// Moves `slack` minor units the producer could not take onto the other
    /// entries. Positive slack adds debit, negative slack removes it.
    /// Returns false if the other entries cannot hold it.
    fn spill(&mut self, mut slack: i64) -> bool {
        for entry in self.non_absorbing_mut() {
            if slack == 0 {
                break;
            }
            if slack > 0 {
                let add = slack.min((entry.remaining() - entry.debit).max(0));
                entry.debit += add;
                slack -= add;
            } else {
                let take = (-slack).min(entry.debit);
                entry.debit -= take;
                slack += take;
            }
        }
        slack == 0
    }

    fn into_record(
        self,
        record: &SettlementRecord,
        fraction: RefundFraction,
        cumulative: RefundFraction,
        target: i64,
    ) -> ReversalRecord {
        let currency = record.gross.currency();
        let mut debits = vec![0i64; record.shares.len()];
        if let Some(slot) = debits.get_mut(self.producer_index) {
            *slot = self.producer.debit;
        }
        for (index, entry) in &self.sharers {
            debits[*index] = entry.debit;
        }

        let shares = record
            .shares
            .iter()
            .zip(debits)
            .map(|(share, debit)| Share {
                role: share.role,
                party_id: share.party_id.clone(),
                commission: share.commission,
                amount: Money::new(debit, currency),
            })
            .collect();

        ReversalRecord {
            id: Uuid::new_v4().to_string(),
            settlement_id: record.id.clone(),
            order_id: record.order_id.clone(),
            fraction,
            cumulative,
            refunded: Money::new(target, currency),
            platform_fee: Money::new(self.platform.debit, currency),
            shares,
        }
    }
}

/// Fraction of the sale still eligible for refund.
pub fn refundable(record: &SettlementRecord, prior: &[ReversalRecord]) -> CoreResult<RefundFraction> {
    let refunded = prior
        .iter()
        .filter(|r| r.settlement_id == record.id)
        .try_fold(RefundFraction::zero(), |acc, r| acc.checked_add(&r.fraction))?;
    Ok(refunded.complement())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::fee_schedule::FeeSchedule;
    use crate::ledger::{Participant, ParticipantLedger};
    use crate::rate::Rate;
    use crate::settlement::settle;
    use proptest::prelude::*;

    fn kz(minor: i64) -> Money {
        Money::new(minor, Currency::KZ)
    }

    fn co_produced(gross: i64, bps: u32) -> SettlementRecord {
        let ledger =
            ParticipantLedger::new(vec![Participant::co_producer(Rate::from_bps(bps))]).unwrap();
        settle(kz(gross), &FeeSchedule::default(), &ledger).unwrap()
    }

    fn fraction(num: u64, den: u64) -> RefundFraction {
        RefundFraction::new(num, den).unwrap()
    }

    #[test]
    fn test_full_refund_worked_example() {
        let record = co_produced(10000, 3000);
        let reversal = reverse(&record, RefundFraction::full()).unwrap();

        assert_eq!(reversal.refunded, kz(10000));
        assert_eq!(reversal.platform_fee, kz(899));
        assert_eq!(reversal.amount_for(Role::CoProducer), kz(2730));
        assert_eq!(reversal.amount_for(Role::Producer), kz(6371));
        assert_eq!(reversal.settlement_id, record.id);
        assert!(reversal.cumulative.is_full());
        assert!(reversal.verify().is_ok());
    }

    #[test]
    fn test_half_then_half() {
        let record = co_produced(10000, 3000);
        let first = reverse(&record, fraction(1, 2)).unwrap();

        assert_eq!(first.refunded, kz(5000));
        assert_eq!(first.platform_fee, kz(450));
        assert_eq!(first.amount_for(Role::CoProducer), kz(1365));
        assert_eq!(first.amount_for(Role::Producer), kz(3185));

        let second = reverse_after(&record, &[first], fraction(1, 2)).unwrap();
        assert_eq!(second.refunded, kz(5000));
        assert_eq!(second.platform_fee, kz(449));
        assert_eq!(second.amount_for(Role::CoProducer), kz(1365));
        assert_eq!(second.amount_for(Role::Producer), kz(3186));
        assert!(second.cumulative.is_full());
    }

    #[test]
    fn test_zero_fraction_moves_nothing() {
        let record = co_produced(10000, 3000);

        let nothing = reverse(&record, RefundFraction::zero()).unwrap();
        assert!(nothing.refunded.is_zero());
        assert!(nothing.platform_fee.is_zero());
        assert!(nothing.amount_for(Role::CoProducer).is_zero());
        assert!(nothing.amount_for(Role::Producer).is_zero());
        assert!(nothing.cumulative.is_zero());
        assert!(nothing.verify().is_ok());

        // After a partial refund the cumulative fraction stays where it was
        let half = reverse(&record, fraction(1, 2)).unwrap();
        let again = reverse_after(&record, &[half.clone()], RefundFraction::zero()).unwrap();
        assert!(again.refunded.is_zero());
        assert_eq!(again.cumulative, fraction(1, 2));
        assert_eq!(
            refundable(&record, &[half, again]).unwrap(),
            fraction(1, 2)
        );
    }

    #[test]
    fn test_thirds_add_up_exactly() {
        let record = co_produced(10001, 3333);
        let mut history = Vec::new();
        for _ in 0..3 {
            let reversal = reverse_after(&record, &history, fraction(1, 3)).unwrap();
            assert!(reversal.verify().is_ok());
            history.push(reversal);
        }

        let sum = |f: &dyn Fn(&ReversalRecord) -> i64| history.iter().map(f).sum::<i64>();
        assert_eq!(sum(&|r| r.refunded.minor()), 10001);
        assert_eq!(sum(&|r| r.platform_fee.minor()), record.platform_fee.minor());
        assert_eq!(
            sum(&|r| r.amount_for(Role::Producer).minor()),
            record.producer_share().minor()
        );
        assert_eq!(
            sum(&|r| r.amount_for(Role::CoProducer).minor()),
            record.amount_for(Role::CoProducer).minor()
        );
    }

    #[test]
    fn test_zero_producer_share_spills_to_sharer() {
        let record = co_produced(10000, 10000);
        assert_eq!(record.producer_share(), kz(0));

        let reversal = reverse(&record, fraction(1, 2)).unwrap();
        assert_eq!(reversal.refunded, kz(5000));
        assert_eq!(reversal.amount_for(Role::Producer), kz(0));
        assert_eq!(reversal.platform_fee, kz(450));
        assert_eq!(reversal.amount_for(Role::CoProducer), kz(4550));
    }

    #[test]
    fn test_over_refund() {
        let record = co_produced(10000, 3000);
        let first = reverse(&record, fraction(3, 5)).unwrap();
        let err = reverse_after(&record, &[first], fraction(1, 2)).unwrap_err();
        assert_eq!(
            err,
            CoreError::OverRefund {
                requested_bps: 5000,
                remaining_bps: 4000
            }
        );
    }

    #[test]
    fn test_invalid_fraction() {
        let record = co_produced(10000, 3000);
        let bad: RefundFraction =
            serde_json::from_str(r#"{"numerator":3,"denominator":2}"#).unwrap();
        assert!(matches!(
            reverse(&record, bad),
            Err(CoreError::InvalidFraction { .. })
        ));
    }

    #[test]
    fn test_foreign_reversal_rejected() {
        let a = co_produced(10000, 3000);
        let b = co_produced(20000, 3000);
        let reversal = reverse(&a, fraction(1, 4)).unwrap();
        let err = reverse_after(&b, &[reversal], fraction(1, 4)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::ForeignReversal { .. })
        ));
    }

    #[test]
    fn test_refundable() {
        let record = co_produced(10000, 3000);
        let first = reverse(&record, fraction(1, 4)).unwrap();
        assert_eq!(refundable(&record, &[first]).unwrap(), fraction(3, 4));
        assert!(refundable(&record, &[]).unwrap().is_full());
    }

    fn arb_refunds() -> impl Strategy<Value = Vec<u32>> {
        // Basis points of each partial refund; the remainder is refunded last.
        proptest::collection::vec(1u32..=4_000, 0..4)
    }

    proptest! {
        #[test]
        fn prop_partial_refunds_reverse_exactly(
            gross in 0i64..100_000_000,
            bps in 0u32..=10_000,
            affiliate in any::<bool>(),
            refunds in arb_refunds(),
        ) {
            let participant = if affiliate {
                Participant::affiliate(Rate::from_bps(bps))
            } else {
                Participant::co_producer(Rate::from_bps(bps))
            };
            let ledger = ParticipantLedger::new(vec![participant]).unwrap();
            let record = settle(kz(gross), &FeeSchedule::default(), &ledger).unwrap();

            let mut history: Vec<ReversalRecord> = Vec::new();
            for step in refunds {
                let f = RefundFraction::from_bps(step).unwrap();
                match reverse_after(&record, &history, f) {
                    Ok(r) => {
                        prop_assert!(r.verify().is_ok());
                        prop_assert!(r.shares.iter().all(|s| !s.amount.is_negative()));
                        prop_assert!(!r.platform_fee.is_negative());
                        history.push(r);
                    }
                    Err(CoreError::OverRefund { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }

            let rest = refundable(&record, &history).unwrap();
            let last = reverse_after(&record, &history, rest).unwrap();
            prop_assert!(last.cumulative.is_full());
            history.push(last);

            let total = |f: &dyn Fn(&ReversalRecord) -> i64| history.iter().map(f).sum::<i64>();
            prop_assert_eq!(total(&|r| r.refunded.minor()), gross);
            prop_assert_eq!(total(&|r| r.platform_fee.minor()), record.platform_fee.minor());
            for share in &record.shares {
                prop_assert_eq!(total(&|r| r.amount_for(share.role).minor()), share.amount.minor());
            }
        }
    }
}
