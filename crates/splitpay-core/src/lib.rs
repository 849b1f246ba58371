//! # splitpay-core: Commission Settlement Engine
//!
//! This crate decides who gets how much of every sale. It contains the
//! settlement and reversal arithmetic as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitPay Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │     Checkout / Refund handlers / Dashboard "you receive"        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          splitpay-db (CommissionService, repositories)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ splitpay-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │   money   │  │fee_schedule│  │ settlement │  │  report  │  │   │
//! │  │   │   rate    │  │   ledger   │  │  reversal  │  │conversion│  │   │
//! │  │   │ fraction  │  │ agreement  │  │            │  │          │  │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`], [`currency`], [`rate`], [`fraction`] - Integer money and exact ratios
//! - [`fee_schedule`] - Platform take rate per currency
//! - [`ledger`], [`agreement`] - Who shares in a sale
//! - [`settlement`] - Gross → platform fee, net, shares
//! - [`reversal`] - Refund → proportional debits
//! - [`conversion`], [`report`] - Cross-currency aggregation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Conservation**: fee plus shares always equals gross, to the minor unit
//! 2. **Producer absorbs rounding**: every other share is computed directly
//! 3. **Integer Money**: minor units in i64, rates in basis points
//! 4. **Explicit Errors**: invalid ledgers and over-refunds fail, never clamp
//!
//! ## Example Usage
//!
//! ```rust
//! use splitpay_core::{settle, Currency, FeeSchedule, Money, Participant, ParticipantLedger, Rate, Role};
//!
//! let ledger = ParticipantLedger::new(vec![Participant::co_producer(Rate::from_bps(3000))]).unwrap();
//! let record = settle(Money::new(10000, Currency::KZ), &FeeSchedule::default(), &ledger).unwrap();
//!
//! assert_eq!(record.platform_fee.minor(), 899);
//! assert_eq!(record.net.minor(), 9101);
//! assert_eq!(record.amount_for(Role::CoProducer).minor(), 2730);
//! assert_eq!(record.producer_share().minor(), 6371);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agreement;
pub mod conversion;
pub mod currency;
pub mod error;
pub mod fee_schedule;
pub mod fraction;
pub mod ledger;
pub mod money;
pub mod rate;
pub mod report;
pub mod reversal;
pub mod settlement;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use agreement::{resolve_ledger, AffiliateAgreement, AgreementStatus, CoProductionAgreement, ResolvedLedger};
pub use conversion::{CurrencyConverter, ExchangeRates};
pub use currency::Currency;
pub use error::{CoreError, CoreResult, ValidationError};
pub use fee_schedule::FeeSchedule;
pub use fraction::RefundFraction;
pub use ledger::{Participant, ParticipantLedger, Role};
pub use money::Money;
pub use rate::Rate;
pub use report::{RevenueReport, RoleTotals};
pub use reversal::{refundable, reverse, reverse_after, ReversalRecord};
pub use settlement::{settle, settle_order, SettlementRecord, Share};
