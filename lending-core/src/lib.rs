//! Micro-lending ledger core
//!
//! Pooled lending ledger: lenders deposit into a shared pool, borrowers
//! request small fixed-rate loans, an owner approves them, and borrowers
//! repay principal plus flat interest back into the pool.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns all state; commands are serialized
//! - **Custody Seam**: Value transfers go through the [`Custody`] trait
//! - **Effects Before Transfer**: Outbound value moves only after state is committed,
//!   and a failed transfer restores the pre-operation state
//! - **Persistence**: Optional RocksDB store; each commit writes one batch of touched records

#![forbid(unsafe_code)]
//!
//! # Invariants
//!
//! - Pool conservation: `total_pool == Σ deposited − Σ withdrawn − Σ approved principal + Σ collected repayments`
//! - Loan ids start at 1 and strictly increase
//! - Approval and repayment each happen at most once per loan
//! - The owner is fixed when the ledger is created

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod error;
pub mod config;
pub mod policy;
pub mod pool;
pub mod loans;
pub mod custody;
pub mod controller;
pub mod storage;
pub mod actor;
pub mod ledger;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AccountId, EventRecord, LedgerEvent, LenderInfo, LoanDetails, LoanId, LoanStatus,
    PoolStats, RepaymentReceipt,
};
pub use config::Config;
pub use controller::LedgerController;
pub use custody::{Custody, SimulatedBank};
pub use ledger::Ledger;
