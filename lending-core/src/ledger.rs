//! Main ledger orchestration layer
//!
//! This module ties together the controller, custody, storage and actor
//! components into a high-level async API.
//!
//! # Example
//!
//! ```no_run
//! use lending_core::{custody::SimulatedBank, AccountId, Config, Ledger};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> lending_core::Result<()> {
//!     let config = Config::default();
//!     let bank = SimulatedBank::new();
//!     let lender = AccountId::new("lender1");
//!     bank.fund(&lender, Decimal::ONE);
//!
//!     let ledger = Ledger::open(config, bank).await?;
//!     ledger.deposit_to_pool(lender, Decimal::ONE).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    controller::LedgerController,
    custody::Custody,
    metrics::Metrics,
    storage::Storage,
    types::{
        AccountId, EventRecord, LenderInfo, LoanDetails, LoanId, PoolStats, RepaymentReceipt,
    },
    Config, Error, Result,
};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for async operations
    handle: LedgerHandle,

    /// Actor task
    task: JoinHandle<()>,

    /// Metrics shared with the actor
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// When storage is enabled and holds committed state, the ledger resumes
    /// from it; otherwise the ledger starts empty.
    pub async fn open(config: Config, custody: impl Custody) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()?;
        let custody: Box<dyn Custody> = Box::new(custody);

        let (controller, store) = if config.storage.enabled {
            let store = Storage::open(&config.storage)?;
            let controller = match store.load()? {
                Some(snapshot) => LedgerController::from_snapshot(&config, custody, snapshot)?,
                None => LedgerController::new(&config, custody),
            };
            (controller, Some(store))
        } else {
            (LedgerController::new(&config, custody), None)
        };

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            owner = %config.owner,
            min_loan = %config.loans.min_loan,
            max_loan = %config.loans.max_loan,
            interest_rate_bps = config.loans.interest_rate_bps,
            "Lending ledger opened"
        );

        let (handle, task) = spawn_ledger_actor(controller, store, metrics.clone(), &config.actor);

        Ok(Self {
            handle,
            task,
            metrics,
            config,
        })
    }

    /// Cloneable handle for concurrent callers
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Ledger owner
    pub fn owner(&self) -> &AccountId {
        &self.config.owner
    }

    /// Receive events committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.handle.subscribe()
    }

    /// Deposit `amount` from `caller` into the pool
    pub async fn deposit_to_pool(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.handle.deposit_to_pool(caller, amount).await
    }

    /// Withdraw `amount` of `caller`'s available balance
    pub async fn withdraw_from_pool(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.handle.withdraw_from_pool(caller, amount).await
    }

    /// Record a loan request
    pub async fn request_loan(&self, caller: AccountId, amount: Decimal) -> Result<LoanId> {
        self.handle.request_loan(caller, amount).await
    }

    /// Approve and disburse a loan (owner only)
    pub async fn approve_loan(&self, caller: AccountId, loan_id: LoanId) -> Result<()> {
        self.handle.approve_loan(caller, loan_id).await
    }

    /// Repay a loan with attached `value`
    pub async fn repay_loan(
        &self,
        caller: AccountId,
        loan_id: LoanId,
        value: Decimal,
    ) -> Result<RepaymentReceipt> {
        self.handle.repay_loan(caller, loan_id, value).await
    }

    /// Principal plus flat interest
    pub async fn calculate_repayment_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        self.handle.calculate_repayment_amount(loan_id).await
    }

    /// Loan projection
    pub async fn get_loan_details(&self, loan_id: LoanId) -> Result<LoanDetails> {
        self.handle.get_loan_details(loan_id).await
    }

    /// Lender accounting view
    pub async fn get_lender_info(&self, lender: AccountId) -> Result<LenderInfo> {
        self.handle.get_lender_info(lender).await
    }

    /// Current pool balance
    pub async fn total_pool(&self) -> Result<Decimal> {
        self.handle.total_pool().await
    }

    /// Loans requested by `borrower`
    pub async fn loans_for(&self, borrower: AccountId) -> Result<Vec<LoanDetails>> {
        self.handle.loans_for(borrower).await
    }

    /// Aggregate statistics
    pub async fn pool_stats(&self) -> Result<PoolStats> {
        self.handle.pool_stats().await
    }

    /// Journal entries with sequence greater than `after`
    pub async fn events_since(&self, after: u64) -> Result<Vec<EventRecord>> {
        self.handle.events_since(after).await
    }

    /// Verify money conservation against custody
    pub async fn check_conservation(&self) -> Result<()> {
        self.handle.check_conservation().await
    }

    /// Shutdown ledger and wait for the actor to finish
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.task
            .await
            .map_err(|e| Error::Concurrency(format!("Ledger actor failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::SimulatedBank;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let ledger = Ledger::open(Config::default(), SimulatedBank::new())
            .await
            .unwrap();
        assert_eq!(ledger.owner(), &AccountId::new("owner"));
        assert_eq!(ledger.total_pool().await.unwrap(), Decimal::ZERO);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut config = Config::default();
        config.loans.min_loan = Decimal::ZERO;
        let result = Ledger::open(config, SimulatedBank::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.enabled = true;
        config.storage.data_dir = temp_dir.path().to_path_buf();

        let bank = SimulatedBank::new();
        let lender = AccountId::new("lender1");
        let borrower = AccountId::new("borrower1");
        bank.fund(&lender, dec("1"));

        let ledger = Ledger::open(config.clone(), bank.clone()).await.unwrap();
        ledger.deposit_to_pool(lender.clone(), dec("1")).await.unwrap();
        let id = ledger.request_loan(borrower.clone(), dec("0.05")).await.unwrap();
        ledger.approve_loan(AccountId::new("owner"), id).await.unwrap();
        ledger.shutdown().await.unwrap();

        let reopened = Ledger::open(config, bank.clone()).await.unwrap();
        assert_eq!(reopened.total_pool().await.unwrap(), dec("0.95"));
        let details = reopened.get_loan_details(id).await.unwrap();
        assert!(details.active);
        assert_eq!(details.borrower, borrower);
        assert_eq!(reopened.events_since(0).await.unwrap().len(), 3);
        reopened.check_conservation().await.unwrap();

        // Ids continue after the restored ones
        let next = reopened.request_loan(borrower, dec("0.01")).await.unwrap();
        assert_eq!(next, LoanId::new(2));
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stored_owner_is_immutable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.enabled = true;
        config.storage.data_dir = temp_dir.path().to_path_buf();

        let bank = SimulatedBank::new();
        bank.fund(&AccountId::new("l"), dec("1"));
        let ledger = Ledger::open(config.clone(), bank.clone()).await.unwrap();
        ledger.deposit_to_pool(AccountId::new("l"), dec("1")).await.unwrap();
        ledger.shutdown().await.unwrap();

        config.owner = AccountId::new("someone-else");
        let result = Ledger::open(config, bank).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
