//! # SplitPay Configuration
//!
//! Where the ledger lives and what the platform charges.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SPLITPAY_DB_PATH=/var/lib/splitpay/ledger.db                       │
//! │     SPLITPAY_MAX_CONNECTIONS=10                                        │
//! │     SPLITPAY_FEE_KZ=8.99                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/splitpay/splitpay.toml (Linux)                           │
//! │     ~/Library/Application Support/com.splitpay.splitpay/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     8.99% for KZ, 9.99% for every other currency                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # splitpay.toml
//! [database]
//! path = "/var/lib/splitpay/ledger.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//! busy_timeout_ms = 5000
//!
//! [fees]
//! KZ = "8.99"
//! USD = "9.99%"
//! ```
//!
//! Fee entries only override the currencies they name; the rest keep the
//! default take rates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use splitpay_core::{Currency, FeeSchedule, Rate};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "splitpay.toml";

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first use.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long a refund or checkout waits for another writer.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "splitpay", "splitpay")
        .map(|dirs| dirs.data_dir().join("splitpay.db"))
        .unwrap_or_else(|| PathBuf::from("./splitpay.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPayConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Take-rate overrides keyed by currency code, as percentage strings.
    #[serde(default)]
    pub fees: BTreeMap<String, String>,
}

impl SplitPayConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (splitpay.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a config file body.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `SPLITPAY_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SPLITPAY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("SPLITPAY_MAX_CONNECTIONS") {
            self.database.max_connections = max.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("SPLITPAY_MAX_CONNECTIONS is not a number: '{}'", max))
            })?;
        }

        for currency in Currency::ALL {
            if let Some(rate) = lookup(&format!("SPLITPAY_FEE_{}", currency.code())) {
                debug!(currency = %currency, rate = %rate, "Overriding fee from environment");
                self.fees.insert(currency.code().to_string(), rate);
            }
        }

        Ok(())
    }

    /// Validates the configuration, including every fee entry.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".into()));
        }
        self.fee_schedule().map(|_| ())
    }

    /// The default take rates with the configured overrides applied.
    pub fn fee_schedule(&self) -> ConfigResult<FeeSchedule> {
        let mut schedule = FeeSchedule::default();

        for (code, value) in &self.fees {
            let invalid = |reason: String| ConfigError::InvalidFee {
                currency: code.clone(),
                reason,
            };
            let currency: Currency = code.parse().map_err(|e| invalid(format!("{}", e)))?;
            let rate = Rate::from_percent_str(value).map_err(|e| invalid(e.to_string()))?;
            schedule = schedule
                .with_rate(currency, rate)
                .map_err(|e| invalid(e.to_string()))?;
        }

        Ok(schedule)
    }

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let db = &self.database;
        DbConfig::new(&db.path)
            .max_connections(db.max_connections)
            .min_connections(db.min_connections)
            .connect_timeout(Duration::from_secs(db.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(db.busy_timeout_ms))
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "splitpay", "splitpay")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}
