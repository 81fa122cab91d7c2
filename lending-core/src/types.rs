//! Core types for the lending ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode records in RocksDB)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Participant identity (lender, borrower or owner)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential loan identifier, starting at 1
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LoanId(u64);

impl LoanId {
    /// First id handed out by a fresh registry
    pub const FIRST: LoanId = LoanId(1);

    /// Create from raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Id following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loan lifecycle state
///
/// `Requested → Active → Repaid`; no other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoanStatus {
    /// Recorded, awaiting owner approval
    Requested = 1,
    /// Approved and disbursed, awaiting repayment
    Active = 2,
    /// Settled (terminal)
    Repaid = 3,
}

impl LoanStatus {
    /// Whether the loan has been approved at some point
    pub fn is_approved(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Repaid)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Active => "active",
            LoanStatus::Repaid => "repaid",
        };
        f.write_str(name)
    }
}

/// Loan record held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// Loan id
    pub loan_id: LoanId,

    /// Requester, immutable
    pub borrower: AccountId,

    /// Requested amount, immutable
    pub principal: Decimal,

    /// Flat interest rate captured at request time (basis points)
    pub interest_rate_bps: u32,

    /// Current status
    pub status: LoanStatus,

    /// Request timestamp
    pub created_at: DateTime<Utc>,

    /// Approval timestamp
    pub approved_at: Option<DateTime<Utc>>,

    /// Repayment timestamp
    pub repaid_at: Option<DateTime<Utc>>,
}

impl LoanRecord {
    /// Approved (active or already repaid)
    pub fn approved(&self) -> bool {
        self.status.is_approved()
    }

    /// Approved and not yet repaid
    pub fn active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Fully repaid
    pub fn repaid(&self) -> bool {
        self.status == LoanStatus::Repaid
    }
}

/// Read-only projection of a loan, returned by `get_loan_details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanDetails {
    /// Loan id
    pub loan_id: LoanId,
    /// Borrower
    pub borrower: AccountId,
    /// Principal
    pub principal: Decimal,
    /// Flat rate (basis points)
    pub interest_rate_bps: u32,
    /// Principal plus interest
    pub repayment_amount: Decimal,
    /// Request timestamp
    pub created_at: DateTime<Utc>,
    /// Approval timestamp
    pub approved_at: Option<DateTime<Utc>>,
    /// Repayment timestamp
    pub repaid_at: Option<DateTime<Utc>>,
    /// Owner approved the loan
    pub approved: bool,
    /// Approved and outstanding
    pub active: bool,
    /// Settled
    pub repaid: bool,
}

/// Per-lender accounting view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LenderInfo {
    /// Cumulative deposits
    pub deposited: Decimal,
    /// Cumulative withdrawals
    pub withdrawn: Decimal,
    /// `deposited - withdrawn`
    pub available: Decimal,
}

/// Outcome of a successful repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentReceipt {
    /// Settled loan
    pub loan_id: LoanId,
    /// Amount taken into the pool
    pub amount_paid: Decimal,
    /// Part of the attached value that was not collected
    pub excess_returned: Decimal,
}

/// Aggregate pool statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Current pool balance
    pub total_pool: Decimal,
    /// Sum of all lender deposits
    pub total_deposited: Decimal,
    /// Sum of all lender withdrawals
    pub total_withdrawn: Decimal,
    /// Principal of active loans
    pub outstanding_principal: Decimal,
    /// Interest received from repaid loans
    pub interest_collected: Decimal,
    /// Number of distinct lenders
    pub lender_count: usize,
    /// Loans awaiting approval
    pub requested_loans: usize,
    /// Loans approved and outstanding
    pub active_loans: usize,
    /// Loans settled
    pub repaid_loans: usize,
}

/// Notification emitted by a committed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Lender added funds to the pool
    DepositMade {
        /// Depositor
        lender: AccountId,
        /// Amount
        amount: Decimal,
    },
    /// Lender took funds out of the pool
    WithdrawalMade {
        /// Withdrawing lender
        lender: AccountId,
        /// Amount
        amount: Decimal,
    },
    /// Borrower recorded a loan request
    LoanRequested {
        /// New loan id
        loan_id: LoanId,
        /// Requester
        borrower: AccountId,
        /// Principal
        amount: Decimal,
    },
    /// Owner approved and principal was disbursed
    LoanApproved {
        /// Loan id
        loan_id: LoanId,
        /// Recipient
        borrower: AccountId,
        /// Disbursed principal
        amount: Decimal,
    },
    /// Loan settled
    LoanRepaid {
        /// Loan id
        loan_id: LoanId,
        /// Principal plus interest received
        amount: Decimal,
    },
    /// Attached value above the amount due was left with the payer
    ExcessReturned {
        /// Loan id
        loan_id: LoanId,
        /// Payer
        payer: AccountId,
        /// Uncollected excess
        amount: Decimal,
    },
}

impl LedgerEvent {
    /// Event name
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::DepositMade { .. } => "DepositMade",
            LedgerEvent::WithdrawalMade { .. } => "WithdrawalMade",
            LedgerEvent::LoanRequested { .. } => "LoanRequested",
            LedgerEvent::LoanApproved { .. } => "LoanApproved",
            LedgerEvent::LoanRepaid { .. } => "LoanRepaid",
            LedgerEvent::ExcessReturned { .. } => "ExcessReturned",
        }
    }
}

/// Journal entry wrapping an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at 1
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Commit time
    pub recorded_at: DateTime<Utc>,

    /// Payload
    pub event: LedgerEvent,
}
