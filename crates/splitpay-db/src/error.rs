//! # Database and Service Error Types
//!
//! Error types for storage, configuration and the commission service.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (settle / reverse)      │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← Adds context and categorization│                             │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  ServiceError ← What checkout / refund handlers match on               │
//! │                                                                         │
//! │  ConfigError ← toml / env problems, raised once at startup             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use splitpay_core::{CoreError, ValidationError};
use thiserror::Error;

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and operator feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second settlement for the same order id
    /// - Two refunds of one settlement computed from the same history
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Reversal pointing at a settlement that was never stored
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Another connection held the write lock past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    /// A stored row no longer decodes into a valid record.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: String,
        id: String,
        reason: String,
    },

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a Corrupt error for a row that fails to decode.
    pub fn corrupt(entity: impl Into<String>, id: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Corrupt {
            entity: entity.into(),
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// True for unique constraint violations.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// True when the write lock could not be taken in time.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type,
///                               SQLITE_BUSY / SQLITE_LOCKED → DbError::Busy
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // Extended result codes: BUSY (5), BUSY_RECOVERY (261),
                // BUSY_SNAPSHOT (517), BUSY_TIMEOUT (773), LOCKED (6),
                // LOCKED_SHAREDCACHE (262)
                if matches!(
                    db_err.code().as_deref(),
                    Some("5" | "261" | "517" | "773" | "6" | "262")
                ) {
                    return DbError::Busy(msg.to_string());
                }

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Service Error
// =============================================================================

/// Errors surfaced by [`crate::service::CommissionService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The engine refused the operation (invalid ledger, over-refund, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// No settlement exists for the order.
    #[error("No settlement for order {order_id}")]
    NotSettled { order_id: String },

    /// Another refund of the same settlement committed first. Retrying
    /// recomputes from the new history.
    #[error("Concurrent refund on order {order_id}, retry")]
    ConcurrentRefund { order_id: String },
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(err.into())
    }
}

impl ServiceError {
    /// True when the caller should show the message to the user as-is
    /// (bad input or an over-refund), rather than a generic failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Core(_) | ServiceError::NotSettled { .. }
        )
    }

    /// True when the same call can simply be made again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrentRefund { .. })
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to load config: {0}")]
    LoadFailed(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    /// A `[fees]` entry or `SPLITPAY_FEE_*` override is unusable.
    #[error("Invalid fee for {currency}: {reason}")]
    InvalidFee { currency: String, reason: String },

    /// Any other invalid setting.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_classification() {
        let over = ServiceError::Core(CoreError::OverRefund {
            requested_bps: 5000,
            remaining_bps: 4000,
        });
        assert!(over.is_user_error());

        let db = ServiceError::Db(DbError::PoolExhausted);
        assert!(!db.is_user_error());
        assert!(!db.is_retryable());

        let race = ServiceError::ConcurrentRefund {
            order_id: "order-1".to_string(),
        };
        assert!(race.is_retryable());
        assert!(!race.is_user_error());
        assert!(DbError::Busy("database is locked".into()).is_busy());
    }

    #[test]
    fn test_validation_error_wraps_through_core() {
        let err: ServiceError = ValidationError::ExclusiveRoles.into();
        assert!(matches!(err, ServiceError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn test_unique_violation_helper() {
        assert!(DbError::duplicate("settlements.order_id", "ord-1").is_unique_violation());
        assert!(!DbError::not_found("Settlement", "x").is_unique_violation());
    }
}
