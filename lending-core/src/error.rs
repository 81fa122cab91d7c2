//! Error types for the lending ledger

use crate::types::{AccountId, LoanId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Domain variants are precondition failures: they are raised before any
/// state is touched. Infrastructure variants come from custody, storage or
/// the actor plumbing.
#[derive(Error, Debug)]
pub enum Error {
    /// Deposit or withdrawal amount is zero or negative
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Decimal),

    /// Loan request outside the configured bounds
    #[error("Invalid loan amount: {amount} (allowed {min}..={max})")]
    InvalidLoanAmount {
        /// Requested amount
        amount: Decimal,
        /// Lower bound
        min: Decimal,
        /// Upper bound
        max: Decimal,
    },

    /// Caller is not allowed to perform the action
    #[error("Unauthorized: {0}")]
    Unauthorized(AccountId),

    /// Unknown loan id
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// Approval of a loan that was already approved
    #[error("Loan already approved: {0}")]
    LoanAlreadyApproved(LoanId),

    /// Repayment of a loan that has not been approved
    #[error("Loan not active: {0}")]
    LoanNotActive(LoanId),

    /// Repayment of a loan that is already settled
    #[error("Loan already repaid: {0}")]
    LoanAlreadyRepaid(LoanId),

    /// Pool cannot cover the requested outflow
    #[error("Insufficient pool funds: requested {requested}, pool holds {available}")]
    InsufficientPoolFunds {
        /// Amount the operation needs
        requested: Decimal,
        /// Current pool balance
        available: Decimal,
    },

    /// Attached value below the amount due
    #[error("Insufficient repayment: required {required}, offered {offered}")]
    InsufficientRepayment {
        /// Principal plus interest
        required: Decimal,
        /// Attached value
        offered: Decimal,
    },

    /// Lender withdrawal above their available balance
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount requested
        requested: Decimal,
        /// Lender's available balance
        available: Decimal,
    },

    /// Decimal arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Custody refused or failed a value transfer
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Invariant violation (pool conservation, custody mismatch)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InvalidLoanAmount { .. } => "invalid_loan_amount",
            Error::Unauthorized(_) => "unauthorized",
            Error::LoanNotFound(_) => "loan_not_found",
            Error::LoanAlreadyApproved(_) => "loan_already_approved",
            Error::LoanNotActive(_) => "loan_not_active",
            Error::LoanAlreadyRepaid(_) => "loan_already_repaid",
            Error::InsufficientPoolFunds { .. } => "insufficient_pool_funds",
            Error::InsufficientRepayment { .. } => "insufficient_repayment",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::ArithmeticOverflow(_) => "arithmetic_overflow",
            Error::TransferFailed(_) => "transfer_failed",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Concurrency(_) => "concurrency",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }

    /// True for rejections caused by the caller's input or the ledger state
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InvalidLoanAmount { .. }
                | Error::Unauthorized(_)
                | Error::LoanNotFound(_)
                | Error::LoanAlreadyApproved(_)
                | Error::LoanNotActive(_)
                | Error::LoanAlreadyRepaid(_)
                | Error::InsufficientPoolFunds { .. }
                | Error::InsufficientRepayment { .. }
                | Error::InsufficientBalance { .. }
        )
    }
}
