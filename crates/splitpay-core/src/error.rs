//! # Error Types
//!
//! Domain-specific error types for splitpay-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  splitpay-core errors (this file)                                      │
//! │  ├── CoreError        - Settlement / reversal failures                 │
//! │  └── ValidationError  - Ledger shape and input failures                │
//! │                                                                         │
//! │  splitpay-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - What order/refund handlers see                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → handler message    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is a local, non-retriable failure. The engine performs no
//! I/O, so there is no transient error class here.

use thiserror::Error;

use crate::currency::Currency;

// =============================================================================
// Core Error
// =============================================================================

/// Settlement engine errors.
///
/// The engine fails fast: a settlement or reversal is either produced in full
/// or not at all. Callers must surface these, never clamp or default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Arithmetic between two different currencies.
    ///
    /// ## When This Occurs
    /// - Adding a USD share to a KZ total
    /// - Converting inside the settlement calculator (never allowed,
    ///   conversion happens before entry)
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// No fee or exchange rate is configured for the currency.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Gross amount is negative or missing.
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Refund fraction outside [0, 1].
    #[error("Invalid refund fraction: {reason}")]
    InvalidFraction { reason: String },

    /// Refund would exceed what is still eligible.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale 10000 KZ, already refunded 60%
    ///      │
    ///      ▼
    /// refund 50% requested
    ///      │
    ///      ▼
    /// OverRefund { requested_bps: 5000, remaining_bps: 4000 }
    ///      │
    ///      ▼
    /// UI shows: "refund exceeds amount eligible"
    /// ```
    #[error("Refund exceeds amount eligible: requested {requested_bps} bps, remaining {remaining_bps} bps")]
    OverRefund {
        requested_bps: u32,
        remaining_bps: u32,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by ledger validation and by parsers for rates, currencies and
/// fractions, before any money moves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., malformed percentage string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A role appears more often than the ledger allows.
    #[error("{role} may appear at most once per sale")]
    DuplicateRole { role: String },

    /// Co-production and affiliation on the same sale.
    #[error("co-producer and affiliate commissions are mutually exclusive")]
    ExclusiveRoles,

    /// Commissions add up to more than the whole net amount.
    #[error("commissions total {total_bps} bps, more than 10000")]
    CommissionOverflow { total_bps: u32 },

    /// A revenue-sharing agreement was applied to another product's sale.
    #[error("agreement {agreement_id} does not cover product {product_id}")]
    ForeignAgreement {
        agreement_id: String,
        product_id: String,
    },

    /// A reversal was paired with a settlement it does not belong to.
    #[error("reversal {reversal_id} does not belong to settlement {settlement_id}")]
    ForeignReversal {
        reversal_id: String,
        settlement_id: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
