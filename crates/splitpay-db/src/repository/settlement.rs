//! # Settlement Repository
//!
//! Database operations for settlements and their shares.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settlements                        settlement_shares                   │
//! │  ┌──────────────────────────┐       ┌──────────────────────────────┐   │
//! │  │ id (uuid)                │◄──────│ settlement_id                │   │
//! │  │ order_id (UNIQUE)        │       │ position  0 = producer       │   │
//! │  │ currency, gross_minor    │       │ role, party_id               │   │
//! │  │ take_rate_bps            │       │ commission_bps, amount_minor │   │
//! │  │ platform_fee_minor       │       └──────────────────────────────┘   │
//! │  │ net_minor, created_at    │                                          │
//! │  └──────────────────────────┘                                          │
//! │                                                                         │
//! │  Header and shares are written in one transaction, so a reader never   │
//! │  sees a settlement whose shares don't add up to its net.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use splitpay_core::{Currency, Money, SettlementRecord};

use super::{insert_shares, load_shares, rate_from_column, ShareTable};
use crate::error::{DbError, DbResult};

const SELECT_SETTLEMENT: &str = "SELECT id, order_id, currency, gross_minor, take_rate_bps, \
     platform_fee_minor, net_minor FROM settlements";

#[derive(Debug, sqlx::FromRow)]
struct SettlementRow {
    id: String,
    order_id: Option<String>,
    currency: Currency,
    gross_minor: i64,
    take_rate_bps: i64,
    platform_fee_minor: i64,
    net_minor: i64,
}

/// Repository for settlement database operations.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Stores a settlement with its shares.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when the order already has a settlement.
    pub async fn insert(&self, record: &SettlementRecord) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_settlement(&mut *tx, record, Utc::now()).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    /// Gets a settlement by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SettlementRecord>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<SettlementRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_SETTLEMENT))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Some(hydrate(&mut *conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Gets the settlement for an order.
    pub async fn get_by_order_id(&self, order_id: &str) -> DbResult<Option<SettlementRecord>> {
        let mut conn = self.pool.acquire().await?;
        find_by_order_id(&mut *conn, order_id).await
    }

    /// Settlements in which `party_id` holds a share, newest first.
    pub async fn list_for_party(&self, party_id: &str, limit: u32) -> DbResult<Vec<SettlementRecord>> {
        debug!(party_id = %party_id, limit = limit, "Listing settlements for party");

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<SettlementRow> = sqlx::query_as(&format!(
            "{} WHERE id IN (SELECT settlement_id FROM settlement_shares WHERE party_id = ?1) \
             ORDER BY created_at DESC, id LIMIT ?2",
            SELECT_SETTLEMENT
        ))
        .bind(party_id)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(hydrate(&mut *conn, row).await?);
        }
        Ok(records)
    }

    /// Σ of shares credited to `party_id` in `currency`, in minor units.
    pub async fn credited_to(&self, party_id: &str, currency: Currency) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(s.amount_minor), 0) FROM settlement_shares s \
             JOIN settlements t ON t.id = s.settlement_id \
             WHERE s.party_id = ?1 AND t.currency = ?2",
        )
        .bind(party_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::new(total, currency))
    }

    /// Counts stored settlements.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settlements")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Connection-level operations (usable inside a transaction)
// =============================================================================

/// Writes header and shares on `conn`. The caller owns the transaction.
pub(crate) async fn insert_settlement(
    conn: &mut SqliteConnection,
    record: &SettlementRecord,
    created_at: DateTime<Utc>,
) -> DbResult<()> {
    debug!(
        id = %record.id,
        order_id = ?record.order_id,
        gross = %record.gross,
        "Inserting settlement"
    );

    sqlx::query(
        "INSERT INTO settlements \
         (id, order_id, currency, gross_minor, take_rate_bps, platform_fee_minor, net_minor, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&record.id)
    .bind(record.order_id.as_deref())
    .bind(record.gross.currency())
    .bind(record.gross.minor())
    .bind(record.take_rate.bps() as i64)
    .bind(record.platform_fee.minor())
    .bind(record.net.minor())
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: record.order_id.clone().unwrap_or_else(|| record.id.clone()),
        },
        other => other,
    })?;

    insert_shares(conn, ShareTable::Settlement, &record.id, &record.shares).await
}

/// Reads the settlement for `order_id` on `conn`.
pub(crate) async fn find_by_order_id(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Option<SettlementRecord>> {
    let row: Option<SettlementRow> =
        sqlx::query_as(&format!("{} WHERE order_id = ?1", SELECT_SETTLEMENT))
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

async fn hydrate(conn: &mut SqliteConnection, row: SettlementRow) -> DbResult<SettlementRecord> {
    let currency = row.currency;
    let shares = load_shares(conn, ShareTable::Settlement, &row.id, currency).await?;

    let record = SettlementRecord {
        take_rate: rate_from_column(row.take_rate_bps, "Settlement", &row.id)?,
        gross: Money::new(row.gross_minor, currency),
        platform_fee: Money::new(row.platform_fee_minor, currency),
        net: Money::new(row.net_minor, currency),
        id: row.id,
        order_id: row.order_id,
        shares,
    };

    record
        .verify()
        .map_err(|e| DbError::corrupt("Settlement", &record.id, e))?;
    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use splitpay_core::{settle_order, FeeSchedule, Participant, ParticipantLedger, Rate, Role};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn record(order_id: &str) -> SettlementRecord {
        let ledger = ParticipantLedger::new(vec![
            Participant::producer().with_party("seller-1"),
            Participant::co_producer(Rate::from_bps(3000)).with_party("partner-1"),
        ])
        .unwrap();
        settle_order(
            order_id,
            Money::new(10000, Currency::KZ),
            &FeeSchedule::default(),
            &ledger,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = db().await;
        let original = record("order-1");
        db.settlements().insert(&original).await.unwrap();

        let by_id = db.settlements().get_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(by_id, original);

        let by_order = db.settlements().get_by_order_id("order-1").await.unwrap().unwrap();
        assert_eq!(by_order.shares[0].role, Role::Producer);
        assert_eq!(by_order.amount_for(Role::CoProducer).minor(), 2730);
        assert_eq!(by_order.producer_share().minor(), 6371);
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let db = db().await;
        assert!(db.settlements().get_by_id("nope").await.unwrap().is_none());
        assert!(db.settlements().get_by_order_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_order_rejected() {
        let db = db().await;
        db.settlements().insert(&record("order-1")).await.unwrap();

        let err = db.settlements().insert(&record("order-1")).await.unwrap_err();
        match err {
            DbError::UniqueViolation { value, .. } => assert_eq!(value, "order-1"),
            other => panic!("expected unique violation, got {:?}", other),
        }
        assert_eq!(db.settlements().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_party_queries() {
        let db = db().await;
        db.settlements().insert(&record("order-1")).await.unwrap();
        db.settlements().insert(&record("order-2")).await.unwrap();

        let listed = db.settlements().list_for_party("partner-1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(db.settlements().list_for_party("stranger", 10).await.unwrap().is_empty());

        let credited = db.settlements().credited_to("partner-1", Currency::KZ).await.unwrap();
        assert_eq!(credited, Money::new(5460, Currency::KZ));

        let usd = db.settlements().credited_to("partner-1", Currency::USD).await.unwrap();
        assert!(usd.is_zero());
    }
}
