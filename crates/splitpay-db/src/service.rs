//! # Commission Service
//!
//! The entry point checkout, refund handlers and the dashboard call. Wraps
//! the pure engine with storage.
//!
//! ## Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle_sale(order, gross, ledger)                                     │
//! │       │                                                                 │
//! │       ├── settlement for order exists? ──► return it unchanged         │
//! │       ▼                                                                 │
//! │  settle_order() ──► INSERT ──┬── ok ─────────────► return new record   │
//! │                              └── UNIQUE(order_id) ► re-read and return │
//! │                                  (another checkout won the race)       │
//! │                                                                         │
//! │  refund_sale(order, fraction)     one BEGIN IMMEDIATE transaction      │
//! │       │                                                                 │
//! │       ├── take write lock        ── busy_timeout ──► ConcurrentRefund  │
//! │       ├── load settlement        ── none ──► NotSettled                │
//! │       ├── load prior reversals (n)                                     │
//! │       ├── reverse_after()        ── over-refund ──► Core(OverRefund)   │
//! │       └── INSERT as sequence n+1 ── UNIQUE ──► ConcurrentRefund        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Order ids are trimmed once on entry; `" order-42 "` and `"order-42"` are
//! the same order for every operation here.

use splitpay_core::{
    refundable, reverse_after, settle, settle_order, Currency, FeeSchedule, Money, ParticipantLedger,
    RefundFraction, ReversalRecord, SettlementRecord, ValidationError,
};
use tracing::{debug, info, warn};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::pool::Database;
use crate::repository::{reversal, settlement};

/// Settles and refunds sales against the configured fee schedule.
#[derive(Debug, Clone)]
pub struct CommissionService {
    db: Database,
    fees: FeeSchedule,
}

impl CommissionService {
    pub fn new(db: Database, fees: FeeSchedule) -> Self {
        CommissionService { db, fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The "you receive" split, computed exactly as checkout would.
    /// Nothing is stored.
    pub fn preview(&self, gross: Money, ledger: &ParticipantLedger) -> ServiceResult<SettlementRecord> {
        Ok(settle(gross, &self.fees, ledger)?)
    }

    /// Settles an order once.
    ///
    /// Calling again with the same `order_id` returns the stored settlement,
    /// even if `gross` or `ledger` differ.
    pub async fn settle_sale(
        &self,
        order_id: &str,
        gross: Money,
        ledger: &ParticipantLedger,
    ) -> ServiceResult<SettlementRecord> {
        let order_id = order_key(order_id)?;
        let repo = self.db.settlements();

        if let Some(existing) = repo.get_by_order_id(order_id).await? {
            if existing.gross != gross {
                warn!(
                    order_id = %order_id,
                    stored = %existing.gross,
                    requested = %gross,
                    "Order already settled with a different gross"
                );
            }
            debug!(order_id = %order_id, id = %existing.id, "Order already settled");
            return Ok(existing);
        }

        let record = settle_order(order_id, gross, &self.fees, ledger)?;

        match repo.insert(&record).await {
            Ok(()) => {
                info!(
                    order_id = %order_id,
                    id = %record.id,
                    gross = %record.gross,
                    platform_fee = %record.platform_fee,
                    producer = %record.producer_share(),
                    "Sale settled"
                );
                Ok(record)
            }
            Err(err) if err.is_unique_violation() => {
                debug!(order_id = %order_id, "Lost settlement race, re-reading");
                repo.get_by_order_id(order_id)
                    .await?
                    .ok_or_else(|| ServiceError::Db(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Refunds `fraction` of an order's gross and stores the reversal.
    pub async fn refund_sale(
        &self,
        order_id: &str,
        fraction: RefundFraction,
    ) -> ServiceResult<ReversalRecord> {
        let order_id = order_key(order_id)?;

        // The write lock is taken before the history is read, so refunds of
        // one order queue behind each other instead of racing.
        let mut tx = self
            .db
            .pool()
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| contended(order_id, DbError::from(e)))?;

        let record = settlement::find_by_order_id(&mut *tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotSettled {
                order_id: order_id.to_string(),
            })?;
        let prior = reversal::list_for_settlement(&mut *tx, &record.id).await?;

        let reversed = reverse_after(&record, &prior, fraction)?;
        let sequence = prior.len() as u32 + 1;

        reversal::insert_reversal(&mut *tx, &reversed, sequence, chrono::Utc::now())
            .await
            .map_err(|e| contended(order_id, e))?;

        tx.commit().await.map_err(|e| match DbError::from(e) {
            err if err.is_busy() => contended(order_id, err),
            err => DbError::TransactionFailed(err.to_string()).into(),
        })?;

        info!(
            order_id = %order_id,
            id = %reversed.id,
            fraction = %reversed.fraction,
            cumulative = %reversed.cumulative,
            refunded = %reversed.refunded,
            "Sale refunded"
        );
        Ok(reversed)
    }

    /// Fraction of an order's gross that can still be refunded.
    pub async fn refundable(&self, order_id: &str) -> ServiceResult<RefundFraction> {
        let record = self.settlement_for(order_id).await?;
        let prior = self.db.reversals().list_for_settlement(&record.id).await?;
        Ok(refundable(&record, &prior)?)
    }

    /// Credited shares minus reversal debits for a party, in one currency.
    pub async fn party_balance(&self, party_id: &str, currency: Currency) -> ServiceResult<Money> {
        let credited = self.db.settlements().credited_to(party_id, currency).await?;
        let debited = self.db.reversals().debited_from(party_id, currency).await?;
        Ok(credited.subtract(debited)?)
    }

    /// The stored settlement for an order.
    pub async fn settlement_for(&self, order_id: &str) -> ServiceResult<SettlementRecord> {
        let order_id = order_key(order_id)?;
        self.db
            .settlements()
            .get_by_order_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotSettled {
                order_id: order_id.to_string(),
            })
    }
}

/// The stored form of an order id.
fn order_key(order_id: &str) -> ServiceResult<&str> {
    let key = order_id.trim();
    if key.is_empty() {
        return Err(ValidationError::Required {
            field: "order id".to_string(),
        }
        .into());
    }
    Ok(key)
}

/// Lock contention and a lost sequence race both mean another refund of the
/// order got there first.
fn contended(order_id: &str, err: DbError) -> ServiceError {
    if err.is_busy() || err.is_unique_violation() {
        warn!(order_id = %order_id, error = %err, "Concurrent refund detected");
        ServiceError::ConcurrentRefund {
            order_id: order_id.to_string(),
        }
    } else {
        err.into()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use splitpay_core::{CoreError, Participant, Rate, Role};
    use std::time::Duration;

    async fn service() -> CommissionService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        CommissionService::new(db, FeeSchedule::default())
    }

    fn kz(minor: i64) -> Money {
        Money::new(minor, Currency::KZ)
    }

    fn co_produced() -> ParticipantLedger {
        ParticipantLedger::new(vec![
            Participant::producer().with_party("seller-1"),
            Participant::co_producer(Rate::from_bps(3000)).with_party("partner-1"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let service = service().await;

        let first = service.settle_sale("order-1", kz(10000), &co_produced()).await.unwrap();
        assert_eq!(first.platform_fee.minor(), 899);
        assert_eq!(first.amount_for(Role::CoProducer).minor(), 2730);
        assert_eq!(first.producer_share().minor(), 6371);

        let again = service
            .settle_sale("order-1", kz(20000), &ParticipantLedger::producer_only())
            .await
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(service.database().settlements().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_settles_store_one_record() {
        let service = service().await;
        let ledger = co_produced();

        let (a, b) = tokio::join!(
            service.settle_sale("order-9", kz(10000), &ledger),
            service.settle_sale("order-9", kz(10000), &ledger),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(service.database().settlements().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_ledger_and_gross() {
        let service = service().await;

        let err = service
            .settle_sale("order-2", kz(-1), &ParticipantLedger::producer_only())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::InvalidAmount { .. })));
        assert_eq!(service.database().settlements().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refunds_accumulate_and_stop_at_full() {
        let service = service().await;
        service.settle_sale("order-1", kz(10000), &co_produced()).await.unwrap();

        let half = RefundFraction::new(1, 2).unwrap();
        let first = service.refund_sale("order-1", half).await.unwrap();
        assert_eq!(first.platform_fee.minor(), 450);
        assert_eq!(first.amount_for(Role::CoProducer).minor(), 1365);
        assert_eq!(first.amount_for(Role::Producer).minor(), 3185);

        let second = service.refund_sale("order-1", half).await.unwrap();
        assert_eq!(second.platform_fee.minor(), 449);
        assert_eq!(second.amount_for(Role::Producer).minor(), 3186);
        assert!(second.cumulative.is_full());

        let err = service
            .refund_sale("order-1", RefundFraction::from_bps(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::OverRefund { .. })));
        assert!(service.refundable("order-1").await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_refund_unknown_order() {
        let service = service().await;
        let err = service
            .refund_sale("ghost", RefundFraction::full())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotSettled { .. }));
    }

    #[tokio::test]
    async fn test_party_balance() {
        let service = service().await;
        service.settle_sale("order-1", kz(10000), &co_produced()).await.unwrap();
        service.settle_sale("order-2", kz(10000), &co_produced()).await.unwrap();
        service
            .refund_sale("order-2", RefundFraction::full())
            .await
            .unwrap();

        assert_eq!(service.party_balance("partner-1", Currency::KZ).await.unwrap(), kz(2730));
        assert_eq!(service.party_balance("seller-1", Currency::KZ).await.unwrap(), kz(6371));
        assert!(service
            .party_balance("seller-1", Currency::USD)
            .await
            .unwrap()
            .is_zero());
    }

    #[tokio::test]
    async fn test_padded_order_id_is_the_same_order() {
        let service = service().await;

        let first = service.settle_sale(" order-1 ", kz(10000), &co_produced()).await.unwrap();
        assert_eq!(first.order_id.as_deref(), Some("order-1"));

        let again = service.settle_sale(" order-1 ", kz(10000), &co_produced()).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(service.settlement_for("order-1").await.unwrap(), first);
        assert_eq!(service.database().settlements().count().await.unwrap(), 1);

        let reversed = service
            .refund_sale(" order-1 ", RefundFraction::full())
            .await
            .unwrap();
        assert_eq!(reversed.settlement_id, first.id);
        assert!(service.refundable("order-1\t").await.unwrap().is_zero());

        let err = service
            .settle_sale("   ", kz(10000), &co_produced())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::Validation(_))));
    }

    async fn file_service(dir: &tempfile::TempDir, busy: Duration) -> CommissionService {
        let config = DbConfig::new(dir.path().join("ledger.db")).busy_timeout(busy);
        let db = Database::new(config).await.unwrap();
        CommissionService::new(db, FeeSchedule::default())
    }

    #[tokio::test]
    async fn test_refund_blocked_by_writer_is_concurrent() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_service(&dir, Duration::from_millis(100)).await;
        service.settle_sale("order-1", kz(10000), &co_produced()).await.unwrap();

        let writer = service
            .database()
            .pool()
            .begin_with("BEGIN IMMEDIATE")
            .await
            .unwrap();

        let err = service
            .refund_sale("order-1", RefundFraction::new(1, 2).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentRefund { .. }));
        assert!(err.is_retryable());

        writer.rollback().await.unwrap();

        let retried = service
            .refund_sale("order-1", RefundFraction::new(1, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(retried.cumulative, RefundFraction::new(1, 2).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_refunds_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_service(&dir, Duration::from_secs(5)).await;
        let record = service.settle_sale("order-1", kz(10000), &co_produced()).await.unwrap();

        let mut stored = 0u32;
        for _ in 0..10 {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let service = service.clone();
                    tokio::spawn(async move {
                        service
                            .refund_sale("order-1", RefundFraction::from_bps(1).unwrap())
                            .await
                    })
                })
                .collect();

            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => stored += 1,
                    Err(err) => assert!(err.is_retryable(), "unexpected error: {err:?}"),
                }
            }
        }

        let history = service
            .database()
            .reversals()
            .list_for_settlement(&record.id)
            .await
            .unwrap();
        assert_eq!(history.len() as u32, stored);
        assert_eq!(
            service.refundable("order-1").await.unwrap().to_bps_floor(),
            10000 - stored
        );
    }

    #[tokio::test]
    async fn test_preview_matches_settlement() {
        let service = service().await;

        let preview = service
            .preview(Money::new(2500, Currency::USD), &ParticipantLedger::producer_only())
            .unwrap();
        assert_eq!(preview.platform_fee.minor(), 250);
        assert_eq!(preview.producer_share().minor(), 2250);
    }
}
