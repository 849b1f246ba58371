//! # splitpay-db: Settlement Storage and Services
//!
//! This crate stores settlements and reversals in SQLite and exposes the
//! [`CommissionService`] that checkout and refund handlers call.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitPay Data Flow                               │
//! │                                                                         │
//! │  Checkout completes / refund approved / dashboard preview              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   splitpay-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   service     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ settle_sale   │───►│ Settlement    │    │              │  │   │
//! │  │   │ refund_sale   │    │ Reversal      │    │ 001_settle-  │  │   │
//! │  │   │ party_balance │    │               │    │   ments.sql  │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │ splitpay-core      │ Database (pool.rs)            │   │
//! │  │           ▼ settle / reverse   ▼                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/splitpay/splitpay.db (or SPLITPAY_DB_PATH)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - Settlement and reversal storage
//! - [`service`] - Idempotent settle, transactional refund, balances
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Database, service and config error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splitpay_db::{CommissionService, Database, SplitPayConfig};
//!
//! let config = SplitPayConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let service = CommissionService::new(db, config.fee_schedule()?);
//!
//! let record = service.settle_sale("order-42", gross, &ledger).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::SplitPayConfig;
pub use error::{ConfigError, DbError, ServiceError};
pub use pool::{Database, DbConfig};
pub use service::CommissionService;

// Repository re-exports for convenience
pub use repository::reversal::ReversalRepository;
pub use repository::settlement::SettlementRepository;
