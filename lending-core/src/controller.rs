//! Ledger controller: the sole mutator of pool and loan state
//!
//! Every mutating operation runs in three phases:
//!
//! 1. **Checks**: authorization, bounds and balance preconditions. A failure
//!    here returns before anything is touched.
//! 2. **Effects**: pool and registry updates, preceded by a [`Checkpoint`] of
//!    every record the operation touches.
//! 3. **Transfer**: outbound value through [`Custody`]. If custody refuses,
//!    the checkpoint is restored and the call fails as if it never ran.
//!
//! Inbound value (deposits, repayments) is received during the checks phase
//! boundary, before effects, so state never reflects funds not yet held.
//! Outbound value always leaves after the loan flags have flipped, so a
//! recipient can never observe a loan it could disburse twice.

use crate::{
    custody::{Custody, TransferReceipt},
    policy::{self, LoanPolicy},
    pool::{LenderRecord, PoolLedger},
    loans::LoanRegistry,
    storage::{Changeset, LedgerSnapshot},
    types::{
        AccountId, EventRecord, LedgerEvent, LenderInfo, LoanDetails, LoanId, LoanRecord,
        LoanStatus, PoolStats, RepaymentReceipt,
    },
    Config, Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Pre-effects copy of the records an operation touches
#[derive(Debug)]
struct Checkpoint {
    total_pool: Decimal,
    loan: Option<LoanRecord>,
    lender: Option<(AccountId, Option<LenderRecord>)>,
}

impl Checkpoint {
    fn capture(
        pool: &PoolLedger,
        loans: &LoanRegistry,
        loan_id: Option<LoanId>,
        lender: Option<&AccountId>,
    ) -> Self {
        Self {
            total_pool: pool.total_pool(),
            loan: loan_id.and_then(|id| loans.get(id).ok().cloned()),
            lender: lender.map(|id| (id.clone(), pool.lender_record(id))),
        }
    }

    fn restore(self, pool: &mut PoolLedger, loans: &mut LoanRegistry) {
        pool.restore(self.total_pool, self.lender);
        if let Some(record) = self.loan {
            loans.restore(record);
        }
    }
}

/// Ledger controller
pub struct LedgerController {
    owner: AccountId,
    policy: LoanPolicy,
    borrower_only_repayment: bool,
    pool: PoolLedger,
    loans: LoanRegistry,
    journal: Vec<EventRecord>,
    custody: Box<dyn Custody>,
}

impl fmt::Debug for LedgerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerController")
            .field("owner", &self.owner)
            .field("total_pool", &self.pool.total_pool())
            .field("next_loan_id", &self.loans.next_id())
            .field("events", &self.journal.len())
            .finish_non_exhaustive()
    }
}

impl LedgerController {
    /// Fresh ledger owned by `config.owner`
    pub fn new(config: &Config, custody: Box<dyn Custody>) -> Self {
        Self {
            owner: config.owner.clone(),
            policy: LoanPolicy::new(config.loans.clone()),
            borrower_only_repayment: config.repayment.borrower_only,
            pool: PoolLedger::new(),
            loans: LoanRegistry::new(),
            journal: Vec::new(),
            custody,
        }
    }

    /// Rebuild a ledger from a persisted snapshot
    ///
    /// The owner is fixed at creation; a config naming a different owner is
    /// rejected.
    pub fn from_snapshot(
        config: &Config,
        custody: Box<dyn Custody>,
        snapshot: LedgerSnapshot,
    ) -> Result<Self> {
        if snapshot.owner != config.owner {
            return Err(Error::Config(format!(
                "snapshot owner {} does not match configured owner {}",
                snapshot.owner, config.owner
            )));
        }

        // Sequences are dense from 1
        if let Some((index, record)) = snapshot
            .journal
            .iter()
            .enumerate()
            .find(|(index, record)| record.sequence != *index as u64 + 1)
        {
            return Err(Error::Storage(format!(
                "journal entry {} has sequence {}",
                index, record.sequence
            )));
        }

        let mut controller = Self::new(config, custody);
        controller.pool = snapshot.pool;
        controller.loans = snapshot.loans;
        controller.journal = snapshot.journal;
        Ok(controller)
    }

    /// Records touched by the events after sequence `after`
    pub fn changeset(&self, after: u64) -> Changeset {
        let events = self.events_since(after);

        let mut lenders = BTreeSet::new();
        let mut loans = BTreeSet::new();
        for record in &events {
            match &record.event {
                LedgerEvent::DepositMade { lender, .. }
                | LedgerEvent::WithdrawalMade { lender, .. } => {
                    lenders.insert(lender.clone());
                }
                LedgerEvent::LoanRequested { loan_id, .. }
                | LedgerEvent::LoanApproved { loan_id, .. }
                | LedgerEvent::LoanRepaid { loan_id, .. }
                | LedgerEvent::ExcessReturned { loan_id, .. } => {
                    loans.insert(*loan_id);
                }
            }
        }

        Changeset {
            owner: self.owner.clone(),
            total_pool: self.pool.total_pool(),
            next_loan_id: self.loans.next_id(),
            lenders: lenders
                .into_iter()
                .filter_map(|id| self.pool.lender_record(&id).map(|record| (id, record)))
                .collect(),
            loans: loans
                .into_iter()
                .filter_map(|id| self.loans.get(id).ok().cloned())
                .collect(),
            events,
        }
    }

    // Pool operations

    /// Take `amount` from `caller` into the pool
    pub fn deposit_to_pool(&mut self, caller: &AccountId, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        self.pool.check_deposit(caller, amount)?;

        self.custody.receive(caller, amount)?;
        if let Err(err) = self.pool.record_deposit(caller, amount) {
            return Err(self.return_inbound(caller, amount, err));
        }

        tracing::info!(lender = %caller, %amount, total_pool = %self.pool.total_pool(), "Deposit made");
        self.emit(LedgerEvent::DepositMade {
            lender: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Pay `amount` of `caller`'s available balance back out of the pool
    pub fn withdraw_from_pool(&mut self, caller: &AccountId, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        self.pool.check_withdrawal(caller, amount)?;

        let checkpoint = Checkpoint::capture(&self.pool, &self.loans, None, Some(caller));
        if let Err(err) = self.pool.record_withdrawal(caller, amount) {
            checkpoint.restore(&mut self.pool, &mut self.loans);
            return Err(err);
        }
        self.disburse_or_restore(checkpoint, caller, amount)?;

        tracing::info!(lender = %caller, %amount, total_pool = %self.pool.total_pool(), "Withdrawal made");
        self.emit(LedgerEvent::WithdrawalMade {
            lender: caller.clone(),
            amount,
        });
        Ok(())
    }

    // Loan lifecycle

    /// Record a loan request; no pool check happens here
    pub fn request_loan(&mut self, caller: &AccountId, amount: Decimal) -> Result<LoanId> {
        self.policy.check_amount(amount)?;

        let loan_id = self.loans.create(
            caller.clone(),
            amount,
            self.policy.interest_rate_bps(),
            Utc::now(),
        );

        tracing::info!(%loan_id, borrower = %caller, %amount, "Loan requested");
        self.emit(LedgerEvent::LoanRequested {
            loan_id,
            borrower: caller.clone(),
            amount,
        });
        Ok(loan_id)
    }

    /// Owner approval: activate the loan and disburse its principal
    pub fn approve_loan(&mut self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::Unauthorized(caller.clone()));
        }
        let loan = self.loans.check_approvable(loan_id)?;
        let borrower = loan.borrower.clone();
        let principal = loan.principal;
        self.pool.check_outflow(principal)?;

        let checkpoint = Checkpoint::capture(&self.pool, &self.loans, Some(loan_id), None);
        let effects = self
            .loans
            .mark_approved(loan_id, Utc::now())
            .and_then(|()| self.pool.debit(principal));
        if let Err(err) = effects {
            checkpoint.restore(&mut self.pool, &mut self.loans);
            return Err(err);
        }
        self.disburse_or_restore(checkpoint, &borrower, principal)?;

        tracing::info!(%loan_id, %borrower, %principal, total_pool = %self.pool.total_pool(), "Loan approved");
        self.emit(LedgerEvent::LoanApproved {
            loan_id,
            borrower,
            amount: principal,
        });
        Ok(())
    }

    /// Settle an active loan with attached `value`
    ///
    /// Only the amount due is collected; anything above it stays with the
    /// payer and is reported in the receipt.
    pub fn repay_loan(
        &mut self,
        caller: &AccountId,
        loan_id: LoanId,
        value: Decimal,
    ) -> Result<RepaymentReceipt> {
        let loan = self.loans.check_repayable(loan_id)?;
        if self.borrower_only_repayment && *caller != loan.borrower {
            return Err(Error::Unauthorized(caller.clone()));
        }
        let due = policy::repayment_amount(loan.principal, loan.interest_rate_bps)?;
        if value < due {
            return Err(Error::InsufficientRepayment {
                required: due,
                offered: value,
            });
        }
        self.pool.check_inflow(due)?;

        self.custody.receive(caller, due)?;

        let checkpoint = Checkpoint::capture(&self.pool, &self.loans, Some(loan_id), None);
        let effects = self
            .loans
            .mark_repaid(loan_id, Utc::now())
            .and_then(|()| self.pool.credit(due));
        if let Err(err) = effects {
            checkpoint.restore(&mut self.pool, &mut self.loans);
            return Err(self.return_inbound(caller, due, err));
        }

        let excess = value - due;
        tracing::info!(%loan_id, payer = %caller, amount = %due, %excess, total_pool = %self.pool.total_pool(), "Loan repaid");
        self.emit(LedgerEvent::LoanRepaid {
            loan_id,
            amount: due,
        });
        if excess > Decimal::ZERO {
            self.emit(LedgerEvent::ExcessReturned {
                loan_id,
                payer: caller.clone(),
                amount: excess,
            });
        }

        Ok(RepaymentReceipt {
            loan_id,
            amount_paid: due,
            excess_returned: excess,
        })
    }

    // Queries

    /// Ledger owner
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Current pool balance
    pub fn total_pool(&self) -> Decimal {
        self.pool.total_pool()
    }

    /// Lender accounting view (zeros for unknown identities)
    pub fn get_lender_info(&self, lender: &AccountId) -> LenderInfo {
        self.pool.lender_info(lender)
    }

    /// Named projection of a loan
    pub fn get_loan_details(&self, loan_id: LoanId) -> Result<LoanDetails> {
        self.loans.details(loan_id)
    }

    /// Principal plus flat interest
    pub fn calculate_repayment_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        self.loans.repayment_amount(loan_id)
    }

    /// Loans requested by `borrower`
    pub fn loans_for(&self, borrower: &AccountId) -> Vec<LoanDetails> {
        self.loans.for_borrower(borrower)
    }

    /// Aggregate statistics
    pub fn pool_stats(&self) -> Result<PoolStats> {
        Ok(PoolStats {
            total_pool: self.pool.total_pool(),
            total_deposited: self.pool.total_deposited()?,
            total_withdrawn: self.pool.total_withdrawn()?,
            outstanding_principal: self.loans.outstanding_principal()?,
            interest_collected: self.loans.interest_collected()?,
            lender_count: self.pool.lender_count(),
            requested_loans: self.loans.count(LoanStatus::Requested),
            active_loans: self.loans.count(LoanStatus::Active),
            repaid_loans: self.loans.count(LoanStatus::Repaid),
        })
    }

    /// Journal entries with `sequence > after`
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        // Entry i carries sequence i + 1
        let start = usize::try_from(after).unwrap_or(usize::MAX);
        self.journal
            .get(start..)
            .map(<[EventRecord]>::to_vec)
            .unwrap_or_default()
    }

    /// Sequence of the last journal entry (0 when empty)
    pub fn last_sequence(&self) -> u64 {
        self.journal.last().map(|r| r.sequence).unwrap_or(0)
    }

    /// Check money conservation
    ///
    /// `total_pool` must equal deposits minus withdrawals minus outstanding
    /// principal plus collected interest, and must match what custody holds.
    pub fn check_conservation(&self) -> Result<()> {
        let stats = self.pool_stats()?;
        let expected = stats
            .total_deposited
            .checked_sub(stats.total_withdrawn)
            .and_then(|net| net.checked_sub(stats.outstanding_principal))
            .and_then(|net| net.checked_add(stats.interest_collected))
            .ok_or_else(|| Error::ArithmeticOverflow("conservation totals".to_string()))?;

        if stats.total_pool < Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "negative pool balance {}",
                stats.total_pool
            )));
        }

        if expected != stats.total_pool {
            return Err(Error::InvariantViolation(format!(
                "pool {} does not match ledger totals {}",
                stats.total_pool, expected
            )));
        }

        let held = self.custody.held();
        if held != stats.total_pool {
            return Err(Error::InvariantViolation(format!(
                "custody holds {} but pool records {}",
                held, stats.total_pool
            )));
        }

        Ok(())
    }

    fn disburse_or_restore(
        &mut self,
        checkpoint: Checkpoint,
        to: &AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        match self.custody.disburse(to, amount) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                checkpoint.restore(&mut self.pool, &mut self.loans);
                tracing::error!(%to, %amount, error = %err, "Disbursement failed, state restored");
                Err(err)
            }
        }
    }

    /// Send back value received for an operation that then failed
    ///
    /// Returns `cause` once the value is back with the payer. If custody
    /// refuses the refund, the held value no longer matches the ledger.
    fn return_inbound(&mut self, to: &AccountId, amount: Decimal, cause: Error) -> Error {
        match self.custody.disburse(to, amount) {
            Ok(_) => {
                tracing::warn!(%to, %amount, error = %cause, "Operation failed after receipt, funds returned");
                cause
            }
            Err(refund_err) => {
                tracing::error!(%to, %amount, error = %cause, refund_error = %refund_err, "Failed to return received funds");
                Error::InvariantViolation(format!(
                    "{} received from {} could not be returned after {}: {}",
                    amount, to, cause, refund_err
                ))
            }
        }
    }

    fn emit(&mut self, event: LedgerEvent) {
        let record = EventRecord {
            sequence: self.last_sequence() + 1,
            event_id: Uuid::now_v7(),
            recorded_at: Utc::now(),
            event,
        };
        self.journal.push(record);
    }
}
