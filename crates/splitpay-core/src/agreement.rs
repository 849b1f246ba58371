//! # Revenue-Sharing Agreements
//!
//! Turns a product's co-production and affiliate agreements into the
//! participant ledger for one sale.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Checkout completes for product P at time T                            │
//! │       │                                                                 │
//! │       ├── co-production agreement active at T?  ──► CoProducer entry    │
//! │       │                                                                 │
//! │       ├── affiliate agreement active (buyer came via referral link)?   │
//! │       │        │                                                        │
//! │       │        ├── no co-producer ──────────────► Affiliate entry      │
//! │       │        └── co-producer present ─────────► dropped (flagged)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ParticipantLedger (Producer + at most one sharer)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A co-production contract is bounded in time; an expired or not yet
//! started contract contributes nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::ledger::{Participant, ParticipantLedger};
use crate::rate::Rate;

/// Lifecycle of an invitation to co-produce or promote a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    /// Invitation sent, not yet accepted.
    #[default]
    Pending,
    /// Accepted and in force.
    Active,
    /// Declined by the invitee.
    Rejected,
    /// Ended early by either side.
    Cancelled,
}

/// A co-production contract on one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoProductionAgreement {
    pub id: String,
    pub product_id: String,
    pub co_producer_id: String,
    /// Percentage of net revenue.
    pub commission: Rate,
    pub status: AgreementStatus,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    /// Open-ended when `None`.
    #[ts(as = "Option<String>")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl CoProductionAgreement {
    /// Active status and `starts_at <= now < ends_at`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AgreementStatus::Active
            && self.starts_at <= now
            && self.ends_at.map_or(true, |end| now < end)
    }
}

/// An affiliate's enrollment in a product's affiliate program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AffiliateAgreement {
    pub id: String,
    pub product_id: String,
    pub affiliate_id: String,
    /// Percentage of net revenue.
    pub commission: Rate,
    pub status: AgreementStatus,
}

impl AffiliateAgreement {
    /// Affiliate programs have no contract window.
    pub fn is_active(&self) -> bool {
        self.status == AgreementStatus::Active
    }
}

/// Ledger for one sale plus what resolution had to leave out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLedger {
    pub ledger: ParticipantLedger,
    /// An active affiliate lost to an active co-production agreement.
    pub dropped_affiliate: bool,
}

/// Builds the participant ledger for a sale of `product_id` at `now`.
///
/// ## Rules
/// - Producer always present, credited to `producer_id`
/// - Co-producer only if its agreement is active at `now`
/// - Affiliate only if its agreement is active and no co-producer applies
/// - Agreements for another product are an error, never skipped
pub fn resolve_ledger(
    product_id: &str,
    producer_id: &str,
    co_production: Option<&CoProductionAgreement>,
    affiliate: Option<&AffiliateAgreement>,
    now: DateTime<Utc>,
) -> CoreResult<ResolvedLedger> {
    if producer_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "producer id".to_string(),
        }
        .into());
    }

    let foreign = |agreement_id: &str| ValidationError::ForeignAgreement {
        agreement_id: agreement_id.to_string(),
        product_id: product_id.to_string(),
    };
    if let Some(a) = co_production.filter(|a| a.product_id != product_id) {
        return Err(foreign(&a.id).into());
    }
    if let Some(a) = affiliate.filter(|a| a.product_id != product_id) {
        return Err(foreign(&a.id).into());
    }

    let mut participants = vec![Participant::producer().with_party(producer_id)];
    let co_producer = co_production.filter(|a| a.is_active_at(now));
    let active_affiliate = affiliate.filter(|a| a.is_active());

    if let Some(agreement) = co_producer {
        participants.push(
            Participant::co_producer(agreement.commission).with_party(&agreement.co_producer_id),
        );
    } else if let Some(agreement) = active_affiliate {
        participants
            .push(Participant::affiliate(agreement.commission).with_party(&agreement.affiliate_id));
    }

    Ok(ResolvedLedger {
        ledger: ParticipantLedger::new(participants)?,
        dropped_affiliate: co_producer.is_some() && active_affiliate.is_some(),
    })
}
