//! # Participant Ledger
//!
//! Who shares in a sale, and with what commission.
//!
//! ## Ledger Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Producer        implicit, receives whatever is left of net            │
//! │  CoProducer  ┐                                                          │
//! │              ├─ at most one of the two, commission on net              │
//! │  Affiliate   ┘                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Co-production and affiliation are separate revenue-sharing programs and a
//! single sale runs under one of them at most. Commissions are a percentage
//! of **net** (gross minus platform fee), never of gross.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::rate::{Rate, BPS_PER_WHOLE};

/// Result type for ledger validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Role
// =============================================================================

/// A revenue participant's role in a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owner of the product. Absorbs all rounding.
    Producer,
    /// Partner with a time-bounded co-production contract.
    CoProducer,
    /// Promoter credited through a referral link.
    Affiliate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::CoProducer => write!(f, "co_producer"),
            Role::Affiliate => write!(f, "affiliate"),
        }
    }
}

// =============================================================================
// Participant
// =============================================================================

/// One revenue participant in a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Participant {
    pub role: Role,

    /// Percentage of net revenue. Ignored for the Producer.
    pub commission: Rate,

    /// Account the share is credited to, when known.
    #[serde(default)]
    pub party_id: Option<String>,
}

impl Participant {
    /// The producer entry (commission is implicit).
    pub fn producer() -> Self {
        Participant {
            role: Role::Producer,
            commission: Rate::zero(),
            party_id: None,
        }
    }

    /// A co-producer earning `commission` of net.
    pub fn co_producer(commission: Rate) -> Self {
        Participant {
            role: Role::CoProducer,
            commission,
            party_id: None,
        }
    }

    /// An affiliate earning `commission` of net.
    pub fn affiliate(commission: Rate) -> Self {
        Participant {
            role: Role::Affiliate,
            commission,
            party_id: None,
        }
    }

    /// Attaches the account the share is credited to.
    pub fn with_party(mut self, party_id: impl Into<String>) -> Self {
        self.party_id = Some(party_id.into());
        self
    }

    /// True for co-producers and affiliates.
    #[inline]
    pub fn is_revenue_sharer(&self) -> bool {
        self.role != Role::Producer
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validates the shape of a sale's participant list.
///
/// ## Rules
/// - At most one Producer, one CoProducer, one Affiliate
/// - CoProducer and Affiliate are mutually exclusive
/// - Every commission in [0, 100]
/// - Non-Producer commissions total at most 100
///
/// ## Example
/// ```rust
/// use splitpay_core::ledger::{validate, Participant};
/// use splitpay_core::rate::Rate;
///
/// assert!(validate(&[Participant::co_producer(Rate::from_bps(3000))]).is_ok());
/// assert!(validate(&[
///     Participant::co_producer(Rate::from_bps(3000)),
///     Participant::affiliate(Rate::from_bps(1000)),
/// ])
/// .is_err());
/// ```
pub fn validate(participants: &[Participant]) -> ValidationResult<()> {
    let count = |role: Role| participants.iter().filter(|p| p.role == role).count();

    for role in [Role::Producer, Role::CoProducer, Role::Affiliate] {
        if count(role) > 1 {
            return Err(ValidationError::DuplicateRole {
                role: role.to_string(),
            });
        }
    }

    if count(Role::CoProducer) > 0 && count(Role::Affiliate) > 0 {
        return Err(ValidationError::ExclusiveRoles);
    }

    let mut total_bps: u32 = 0;
    for participant in participants.iter().filter(|p| p.is_revenue_sharer()) {
        let bps = participant.commission.bps();
        if bps > BPS_PER_WHOLE {
            return Err(ValidationError::OutOfRange {
                field: format!("{} commission", participant.role),
                min: 0,
                max: BPS_PER_WHOLE as i64,
            });
        }
        total_bps += bps;
    }

    if total_bps > BPS_PER_WHOLE {
        return Err(ValidationError::CommissionOverflow { total_bps });
    }

    let blank_party = participants
        .iter()
        .find(|p| matches!(&p.party_id, Some(id) if id.trim().is_empty()));
    if let Some(p) = blank_party {
        return Err(ValidationError::Required {
            field: format!("{} party id", p.role),
        });
    }

    Ok(())
}

// =============================================================================
// Participant Ledger
// =============================================================================

/// A validated, ordered participant list for one sale.
///
/// Only constructible through [`ParticipantLedger::new`] (or deserialization,
/// which runs the same validation), so a ledger in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Participant>", into = "Vec<Participant>")]
pub struct ParticipantLedger {
    participants: Vec<Participant>,
}

impl ParticipantLedger {
    /// Validates and wraps a participant list.
    pub fn new(participants: Vec<Participant>) -> ValidationResult<Self> {
        validate(&participants)?;
        Ok(ParticipantLedger { participants })
    }

    /// A sale with no co-producer and no affiliate.
    pub fn producer_only() -> Self {
        ParticipantLedger::default()
    }

    /// All entries, in the order given.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Co-producer / affiliate entries, in ledger order.
    pub fn revenue_sharers(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_revenue_sharer())
    }

    /// The explicit Producer entry, if one was listed.
    pub fn producer(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == Role::Producer)
    }

    /// Account the producer share is credited to, if known.
    pub fn producer_party(&self) -> Option<&str> {
        self.producer().and_then(|p| p.party_id.as_deref())
    }

    /// Sum of co-producer / affiliate commissions.
    pub fn total_commission(&self) -> Rate {
        Rate::from_bps(self.revenue_sharers().map(|p| p.commission.bps()).sum())
    }
}

impl TryFrom<Vec<Participant>> for ParticipantLedger {
    type Error = ValidationError;

    fn try_from(participants: Vec<Participant>) -> Result<Self, Self::Error> {
        ParticipantLedger::new(participants)
    }
}

impl From<ParticipantLedger> for Vec<Participant> {
    fn from(ledger: ParticipantLedger) -> Self {
        ledger.participants
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
