//! # Repository Module
//!
//! Database repository implementations for the settlement ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  CommissionService                                                     │
//! │       │                                                                 │
//! │       │  db.settlements().get_by_order_id("order-42")                  │
//! │       ▼                                                                 │
//! │  SettlementRepository              ReversalRepository                  │
//! │  ├── insert(record)                ├── insert(reversal, sequence)      │
//! │  ├── get_by_id(id)                 ├── list_for_settlement(id)         │
//! │  ├── get_by_order_id(order)        └── debited_from(party, currency)   │
//! │  ├── list_for_party(party, limit)                                      │
//! │  └── credited_to(party, currency)                                      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite: settlements, settlement_shares, reversals, reversal_shares    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are append-only. There is no update or delete path: a refund is a
//! new reversal row, never an edit of the settlement.
//!
//! Each repository also exposes connection-level functions so the service can
//! run several reads and writes inside one transaction.

pub mod reversal;
pub mod settlement;

use sqlx::SqliteConnection;
use splitpay_core::{Currency, Money, Rate, Role, Share};

use crate::error::{DbError, DbResult};

/// A share row as stored in `settlement_shares` / `reversal_shares`.
#[derive(Debug, sqlx::FromRow)]
struct ShareRow {
    role: Role,
    party_id: Option<String>,
    commission_bps: i64,
    amount_minor: i64,
}

impl ShareRow {
    fn into_share(self, currency: Currency, entity: &str, owner_id: &str) -> DbResult<Share> {
        Ok(Share {
            role: self.role,
            party_id: self.party_id,
            commission: rate_from_column(self.commission_bps, entity, owner_id)?,
            amount: Money::new(self.amount_minor, currency),
        })
    }
}

/// Which share table to read or write.
#[derive(Debug, Clone, Copy)]
enum ShareTable {
    Settlement,
    Reversal,
}

impl ShareTable {
    fn entity(self) -> &'static str {
        match self {
            ShareTable::Settlement => "Settlement",
            ShareTable::Reversal => "Reversal",
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            ShareTable::Settlement => {
                "INSERT INTO settlement_shares \
                 (settlement_id, position, role, party_id, commission_bps, amount_minor) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            }
            ShareTable::Reversal => {
                "INSERT INTO reversal_shares \
                 (reversal_id, position, role, party_id, commission_bps, amount_minor) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            }
        }
    }

    fn select_sql(self) -> &'static str {
        match self {
            ShareTable::Settlement => {
                "SELECT role, party_id, commission_bps, amount_minor \
                 FROM settlement_shares WHERE settlement_id = ?1 ORDER BY position"
            }
            ShareTable::Reversal => {
                "SELECT role, party_id, commission_bps, amount_minor \
                 FROM reversal_shares WHERE reversal_id = ?1 ORDER BY position"
            }
        }
    }
}

/// Writes shares in order; `position` preserves the record's share order.
async fn insert_shares(
    conn: &mut SqliteConnection,
    table: ShareTable,
    owner_id: &str,
    shares: &[Share],
) -> DbResult<()> {
    for (position, share) in shares.iter().enumerate() {
        sqlx::query(table.insert_sql())
            .bind(owner_id)
            .bind(position as i64)
            .bind(share.role)
            .bind(share.party_id.as_deref())
            .bind(share.commission.bps() as i64)
            .bind(share.amount.minor())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn load_shares(
    conn: &mut SqliteConnection,
    table: ShareTable,
    owner_id: &str,
    currency: Currency,
) -> DbResult<Vec<Share>> {
    let rows: Vec<ShareRow> = sqlx::query_as(table.select_sql())
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter()
        .map(|row| row.into_share(currency, table.entity(), owner_id))
        .collect()
}

fn rate_from_column(bps: i64, entity: &str, id: &str) -> DbResult<Rate> {
    u32::try_from(bps)
        .map(Rate::from_bps)
        .map_err(|_| DbError::corrupt(entity, id, format!("rate {} bps out of range", bps)))
}
