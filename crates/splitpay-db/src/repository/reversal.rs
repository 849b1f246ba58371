//! # Reversal Repository
//!
//! Database operations for refund reversals.
//!
//! Reversals of one settlement are numbered 1, 2, 3, ... in `sequence`. A
//! refund computed from `n` prior reversals is stored as `n + 1`; if another
//! refund got there first, the unique `(settlement_id, sequence)` key rejects
//! the stale one instead of letting both debit the same history.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use splitpay_core::{Currency, Money, RefundFraction, ReversalRecord};

use super::{insert_shares, load_shares, ShareTable};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ReversalRow {
    id: String,
    settlement_id: String,
    order_id: Option<String>,
    fraction_numerator: i64,
    fraction_denominator: i64,
    cumulative_numerator: i64,
    cumulative_denominator: i64,
    currency: Currency,
    refunded_minor: i64,
    platform_fee_minor: i64,
}

/// Repository for reversal database operations.
#[derive(Debug, Clone)]
pub struct ReversalRepository {
    pool: SqlitePool,
}

impl ReversalRepository {
    /// Creates a new ReversalRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReversalRepository { pool }
    }

    /// Stores a reversal as the `sequence`-th refund of its settlement.
    pub async fn insert(&self, reversal: &ReversalRecord, sequence: u32) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_reversal(&mut *tx, reversal, sequence, Utc::now()).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    /// All reversals of a settlement, oldest first.
    pub async fn list_for_settlement(&self, settlement_id: &str) -> DbResult<Vec<ReversalRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_for_settlement(&mut *conn, settlement_id).await
    }

    /// Σ of reversal debits against `party_id` in `currency`.
    pub async fn debited_from(&self, party_id: &str, currency: Currency) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(s.amount_minor), 0) FROM reversal_shares s \
             JOIN reversals r ON r.id = s.reversal_id \
             WHERE s.party_id = ?1 AND r.currency = ?2",
        )
        .bind(party_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::new(total, currency))
    }
}

// =============================================================================
// Connection-level operations (usable inside a transaction)
// =============================================================================

pub(crate) async fn insert_reversal(
    conn: &mut SqliteConnection,
    reversal: &ReversalRecord,
    sequence: u32,
    created_at: DateTime<Utc>,
) -> DbResult<()> {
    debug!(
        id = %reversal.id,
        settlement_id = %reversal.settlement_id,
        sequence = sequence,
        fraction = %reversal.fraction,
        refunded = %reversal.refunded,
        "Inserting reversal"
    );

    let column = |value: u64| {
        i64::try_from(value).map_err(|_| {
            DbError::Internal(format!(
                "reversal {} fraction part {} exceeds the INTEGER range",
                reversal.id, value
            ))
        })
    };

    sqlx::query(
        "INSERT INTO reversals \
         (id, settlement_id, sequence, order_id, \
          fraction_numerator, fraction_denominator, cumulative_numerator, cumulative_denominator, \
          currency, refunded_minor, platform_fee_minor, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&reversal.id)
    .bind(&reversal.settlement_id)
    .bind(sequence as i64)
    .bind(reversal.order_id.as_deref())
    .bind(column(reversal.fraction.numerator())?)
    .bind(column(reversal.fraction.denominator())?)
    .bind(column(reversal.cumulative.numerator())?)
    .bind(column(reversal.cumulative.denominator())?)
    .bind(reversal.refunded.currency())
    .bind(reversal.refunded.minor())
    .bind(reversal.platform_fee.minor())
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: format!("{}#{}", reversal.settlement_id, sequence),
        },
        other => other,
    })?;

    insert_shares(conn, ShareTable::Reversal, &reversal.id, &reversal.shares).await
}

pub(crate) async fn list_for_settlement(
    conn: &mut SqliteConnection,
    settlement_id: &str,
) -> DbResult<Vec<ReversalRecord>> {
    let rows: Vec<ReversalRow> = sqlx::query_as(
        "SELECT id, settlement_id, order_id, \
                fraction_numerator, fraction_denominator, \
                cumulative_numerator, cumulative_denominator, \
                currency, refunded_minor, platform_fee_minor \
         FROM reversals WHERE settlement_id = ?1 ORDER BY sequence",
    )
    .bind(settlement_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut reversals = Vec::with_capacity(rows.len());
    for row in rows {
        reversals.push(hydrate(&mut *conn, row).await?);
    }
    Ok(reversals)
}

async fn hydrate(conn: &mut SqliteConnection, row: ReversalRow) -> DbResult<ReversalRecord> {
    let currency = row.currency;
    let shares = load_shares(conn, ShareTable::Reversal, &row.id, currency).await?;

    let fraction = fraction_from_columns(row.fraction_numerator, row.fraction_denominator, &row.id)?;
    let cumulative =
        fraction_from_columns(row.cumulative_numerator, row.cumulative_denominator, &row.id)?;

    let reversal = ReversalRecord {
        id: row.id,
        settlement_id: row.settlement_id,
        order_id: row.order_id,
        fraction,
        cumulative,
        refunded: Money::new(row.refunded_minor, currency),
        platform_fee: Money::new(row.platform_fee_minor, currency),
        shares,
    };

    reversal
        .verify()
        .map_err(|e| DbError::corrupt("Reversal", &reversal.id, e))?;
    Ok(reversal)
}

fn fraction_from_columns(numerator: i64, denominator: i64, id: &str) -> DbResult<RefundFraction> {
    let part = |value: i64| {
        u64::try_from(value)
            .map_err(|_| DbError::corrupt("Reversal", id, format!("negative fraction part {}", value)))
    };
    RefundFraction::new(part(numerator)?, part(denominator)?)
        .map_err(|e| DbError::corrupt("Reversal", id, e))
}

// =============================================================================
// Unit Tests
// =============================================================================
