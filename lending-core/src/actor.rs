//! Actor-based concurrency for the ledger
//!
//! One Tokio task owns the [`LedgerController`]. Every caller talks to it
//! through a cloneable [`LedgerHandle`], so mutations are applied one at a
//! time in mailbox order and never interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          LedgerHandle (Clone, many callers)           │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   LedgerController ── Custody (value transfer)        │
//! │          │                                            │
//! │          ├──▶ broadcast::Sender<EventRecord>          │
//! │          └──▶ Storage::commit() (if enabled)          │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    config::ActorConfig,
    controller::LedgerController,
    metrics::Metrics,
    storage::Storage,
    types::{
        AccountId, EventRecord, LenderInfo, LoanDetails, LoanId, PoolStats, RepaymentReceipt,
    },
    Error, Result,
};
use rust_decimal::Decimal;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Deposit into the pool
    DepositToPool {
        caller: AccountId,
        amount: Decimal,
        response: oneshot::Sender<Result<()>>,
    },

    /// Withdraw from the pool
    WithdrawFromPool {
        caller: AccountId,
        amount: Decimal,
        response: oneshot::Sender<Result<()>>,
    },

    /// Record a loan request
    RequestLoan {
        caller: AccountId,
        amount: Decimal,
        response: oneshot::Sender<Result<LoanId>>,
    },

    /// Owner approval
    ApproveLoan {
        caller: AccountId,
        loan_id: LoanId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Repayment with attached value
    RepayLoan {
        caller: AccountId,
        loan_id: LoanId,
        value: Decimal,
        response: oneshot::Sender<Result<RepaymentReceipt>>,
    },

    /// Amount due on a loan
    CalculateRepaymentAmount {
        loan_id: LoanId,
        response: oneshot::Sender<Result<Decimal>>,
    },

    /// Loan projection
    GetLoanDetails {
        loan_id: LoanId,
        response: oneshot::Sender<Result<LoanDetails>>,
    },

    /// Lender accounting view
    GetLenderInfo {
        lender: AccountId,
        response: oneshot::Sender<LenderInfo>,
    },

    /// Current pool balance
    TotalPool {
        response: oneshot::Sender<Decimal>,
    },

    /// Loans of one borrower
    LoansFor {
        borrower: AccountId,
        response: oneshot::Sender<Vec<LoanDetails>>,
    },

    /// Aggregate statistics
    PoolStats {
        response: oneshot::Sender<Result<PoolStats>>,
    },

    /// Journal read
    EventsSince {
        after: u64,
        response: oneshot::Sender<Vec<EventRecord>>,
    },

    /// Conservation check
    CheckConservation {
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    /// Ledger state and custody
    controller: LedgerController,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// RocksDB persistence, if enabled
    store: Option<Storage>,

    /// Metrics
    metrics: Metrics,

    /// Committed events fan-out
    events: broadcast::Sender<EventRecord>,

    /// Last sequence sent to subscribers
    published: u64,

    /// Last sequence written to storage
    persisted: u64,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        controller: LedgerController,
        mailbox: mpsc::Receiver<LedgerMessage>,
        store: Option<Storage>,
        metrics: Metrics,
        events: broadcast::Sender<EventRecord>,
    ) -> Self {
        let published = controller.last_sequence();
        let persisted = published;
        metrics.set_pool_balance(controller.total_pool());
        Self {
            controller,
            mailbox,
            store,
            metrics,
            events,
            published,
            persisted,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!("Ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::DepositToPool {
                caller,
                amount,
                response,
            } => {
                let result = self.mutate(|c| c.deposit_to_pool(&caller, amount));
                if result.is_ok() {
                    self.metrics.deposits_total.inc();
                }
                let _ = response.send(result);
            }

            LedgerMessage::WithdrawFromPool {
                caller,
                amount,
                response,
            } => {
                let result = self.mutate(|c| c.withdraw_from_pool(&caller, amount));
                if result.is_ok() {
                    self.metrics.withdrawals_total.inc();
                }
                let _ = response.send(result);
            }

            LedgerMessage::RequestLoan {
                caller,
                amount,
                response,
            } => {
                let result = self.mutate(|c| c.request_loan(&caller, amount));
                if result.is_ok() {
                    self.metrics.loans_requested_total.inc();
                }
                let _ = response.send(result);
            }

            LedgerMessage::ApproveLoan {
                caller,
                loan_id,
                response,
            } => {
                let result = self.mutate(|c| c.approve_loan(&caller, loan_id));
                if result.is_ok() {
                    self.metrics.loans_approved_total.inc();
                }
                let _ = response.send(result);
            }

            LedgerMessage::RepayLoan {
                caller,
                loan_id,
                value,
                response,
            } => {
                let result = self.mutate(|c| c.repay_loan(&caller, loan_id, value));
                if result.is_ok() {
                    self.metrics.loans_repaid_total.inc();
                }
                let _ = response.send(result);
            }

            LedgerMessage::CalculateRepaymentAmount { loan_id, response } => {
                let _ = response.send(self.controller.calculate_repayment_amount(loan_id));
            }

            LedgerMessage::GetLoanDetails { loan_id, response } => {
                let _ = response.send(self.controller.get_loan_details(loan_id));
            }

            LedgerMessage::GetLenderInfo { lender, response } => {
                let _ = response.send(self.controller.get_lender_info(&lender));
            }

            LedgerMessage::TotalPool { response } => {
                let _ = response.send(self.controller.total_pool());
            }

            LedgerMessage::LoansFor { borrower, response } => {
                let _ = response.send(self.controller.loans_for(&borrower));
            }

            LedgerMessage::PoolStats { response } => {
                let _ = response.send(self.controller.pool_stats());
            }

            LedgerMessage::EventsSince { after, response } => {
                let _ = response.send(self.controller.events_since(after));
            }

            LedgerMessage::CheckConservation { response } => {
                let _ = response.send(self.controller.check_conservation());
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Run one mutating operation and do the post-commit bookkeeping
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut LedgerController) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = op(&mut self.controller);
        self.metrics
            .record_duration(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => self.after_commit(),
            Err(err) => {
                self.metrics.record_rejection(err.kind());
                if err.is_rejection() {
                    tracing::warn!(reason = err.kind(), "Operation rejected: {}", err);
                } else {
                    tracing::error!(reason = err.kind(), "Operation failed: {}", err);
                }
            }
        }

        result
    }

    fn after_commit(&mut self) {
        self.metrics.set_pool_balance(self.controller.total_pool());

        // A failed write is retried with the next commit's changes
        if let Some(store) = &self.store {
            let changes = self.controller.changeset(self.persisted);
            match store.commit(&changes) {
                Ok(()) => {
                    if let Some(last) = changes.events.last() {
                        self.persisted = last.sequence;
                    }
                }
                Err(e) => {
                    self.metrics.persist_failures_total.inc();
                    tracing::error!(
                        pending_events = changes.events.len(),
                        "Failed to persist ledger changes: {}",
                        e
                    );
                }
            }
        }

        for record in self.controller.events_since(self.published) {
            self.published = record.sequence;
            // No subscribers is not an error
            let _ = self.events.send(record);
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    events: broadcast::Sender<EventRecord>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(
        sender: mpsc::Sender<LedgerMessage>,
        events: broadcast::Sender<EventRecord>,
    ) -> Self {
        Self { sender, events }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Deposit into the pool
    pub async fn deposit_to_pool(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.request(|response| LedgerMessage::DepositToPool {
            caller,
            amount,
            response,
        })
        .await?
    }

    /// Withdraw from the pool
    pub async fn withdraw_from_pool(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.request(|response| LedgerMessage::WithdrawFromPool {
            caller,
            amount,
            response,
        })
        .await?
    }

    /// Record a loan request
    pub async fn request_loan(&self, caller: AccountId, amount: Decimal) -> Result<LoanId> {
        self.request(|response| LedgerMessage::RequestLoan {
            caller,
            amount,
            response,
        })
        .await?
    }

    /// Owner approval
    pub async fn approve_loan(&self, caller: AccountId, loan_id: LoanId) -> Result<()> {
        self.request(|response| LedgerMessage::ApproveLoan {
            caller,
            loan_id,
            response,
        })
        .await?
    }

    /// Repay with attached value
    pub async fn repay_loan(
        &self,
        caller: AccountId,
        loan_id: LoanId,
        value: Decimal,
    ) -> Result<RepaymentReceipt> {
        self.request(|response| LedgerMessage::RepayLoan {
            caller,
            loan_id,
            value,
            response,
        })
        .await?
    }

    /// Amount due on a loan
    pub async fn calculate_repayment_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        self.request(|response| LedgerMessage::CalculateRepaymentAmount { loan_id, response })
            .await?
    }

    /// Loan projection
    pub async fn get_loan_details(&self, loan_id: LoanId) -> Result<LoanDetails> {
        self.request(|response| LedgerMessage::GetLoanDetails { loan_id, response })
            .await?
    }

    /// Lender accounting view
    pub async fn get_lender_info(&self, lender: AccountId) -> Result<LenderInfo> {
        self.request(|response| LedgerMessage::GetLenderInfo { lender, response })
            .await
    }

    /// Current pool balance
    pub async fn total_pool(&self) -> Result<Decimal> {
        self.request(|response| LedgerMessage::TotalPool { response })
            .await
    }

    /// Loans of one borrower
    pub async fn loans_for(&self, borrower: AccountId) -> Result<Vec<LoanDetails>> {
        self.request(|response| LedgerMessage::LoansFor { borrower, response })
            .await
    }

    /// Aggregate statistics
    pub async fn pool_stats(&self) -> Result<PoolStats> {
        self.request(|response| LedgerMessage::PoolStats { response })
            .await?
    }

    /// Journal entries after `after`
    pub async fn events_since(&self, after: u64) -> Result<Vec<EventRecord>> {
        self.request(|response| LedgerMessage::EventsSince { after, response })
            .await
    }

    /// Conservation check
    pub async fn check_conservation(&self) -> Result<()> {
        self.request(|response| LedgerMessage::CheckConservation { response })
            .await?
    }

    /// Receive committed events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    controller: LedgerController,
    store: Option<Storage>,
    metrics: Metrics,
    config: &ActorConfig,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity); // Bounded channel for backpressure
    let (events, _) = broadcast::channel(config.event_buffer);
    let actor = LedgerActor::new(controller, rx, store, metrics, events.clone());

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx, events), task)
}
