//! Configuration for the lending ledger

use crate::types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Identity allowed to approve loans
    pub owner: AccountId,

    /// Loan bounds and interest
    pub loans: LoanConfig,

    /// Repayment policy
    pub repayment: RepaymentConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Snapshot storage configuration
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "lending-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            owner: AccountId::new("owner"),
            loans: LoanConfig::default(),
            repayment: RepaymentConfig::default(),
            actor: ActorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Loan bounds and flat interest rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanConfig {
    /// Smallest principal accepted
    pub min_loan: Decimal,

    /// Largest principal accepted
    pub max_loan: Decimal,

    /// Flat interest rate in basis points (500 = 5%)
    pub interest_rate_bps: u32,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            min_loan: Decimal::new(1, 3),   // 0.001
            max_loan: Decimal::new(1, 1),   // 0.1
            interest_rate_bps: 500,         // 5%
        }
    }
}

/// Repayment policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentConfig {
    /// Only the original borrower may repay
    pub borrower_only: bool,
}

impl Default for RepaymentConfig {
    fn default() -> Self {
        Self { borrower_only: true }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,

    /// Event broadcast buffer per subscriber
    pub event_buffer: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            event_buffer: 256,
        }
    }
}

/// RocksDB storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist every committed mutation
    pub enabled: bool,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: PathBuf::from("./data/lending"),
            write_buffer_size_mb: 16,
            max_background_jobs: 2,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(owner) = std::env::var("LENDING_OWNER") {
            config.owner = AccountId::new(owner);
        }

        if let Ok(value) = std::env::var("LENDING_MIN_LOAN") {
            config.loans.min_loan = parse_env("LENDING_MIN_LOAN", &value)?;
        }

        if let Ok(value) = std::env::var("LENDING_MAX_LOAN") {
            config.loans.max_loan = parse_env("LENDING_MAX_LOAN", &value)?;
        }

        if let Ok(value) = std::env::var("LENDING_INTEREST_BPS") {
            config.loans.interest_rate_bps = parse_env("LENDING_INTEREST_BPS", &value)?;
        }

        if let Ok(value) = std::env::var("LENDING_BORROWER_ONLY") {
            config.repayment.borrower_only = parse_env("LENDING_BORROWER_ONLY", &value)?;
        }

        if let Ok(data_dir) = std::env::var("LENDING_DATA_DIR") {
            config.storage.enabled = true;
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.owner.as_str().is_empty() {
            return Err(crate::Error::Config("owner must not be empty".to_string()));
        }

        if self.loans.min_loan <= Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "min_loan must be positive, got {}",
                self.loans.min_loan
            )));
        }

        if self.loans.min_loan > self.loans.max_loan {
            return Err(crate::Error::Config(format!(
                "min_loan {} exceeds max_loan {}",
                self.loans.min_loan, self.loans.max_loan
            )));
        }

        if self.actor.mailbox_capacity == 0 || self.actor.event_buffer == 0 {
            return Err(crate::Error::Config(
                "actor capacities must be non-zero".to_string(),
            ));
        }

        if self.storage.write_buffer_size_mb == 0 || self.storage.max_background_jobs <= 0 {
            return Err(crate::Error::Config(
                "storage buffer size and background jobs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> crate::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", name, e)))
}
