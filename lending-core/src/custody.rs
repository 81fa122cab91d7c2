//! Custody of pooled value
//!
//! The ledger never moves money itself. Inbound payments (deposits,
//! repayments) and outbound payments (disbursements, withdrawals) go through
//! a [`Custody`] implementation. [`SimulatedBank`] is an in-memory
//! implementation with per-account wallets, used by tests and the demo node.

use crate::{types::AccountId, Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Direction of a transfer, seen from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Value entering custody
    Inbound,
    /// Value leaving custody
    Outbound,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Inbound => write!(f, "inbound"),
            TransferDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Proof of an executed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Custody-side reference
    pub reference: String,
    /// Direction
    pub direction: TransferDirection,
    /// Payer (inbound) or payee (outbound)
    pub counterparty: AccountId,
    /// Amount moved
    pub amount: Decimal,
    /// Execution time
    pub executed_at: DateTime<Utc>,
}

/// Holder of the ledger's value
///
/// Implementations must be all-or-nothing: an `Err` means no value moved.
pub trait Custody: Send + 'static {
    /// Take `amount` from `from` into custody
    fn receive(&mut self, from: &AccountId, amount: Decimal) -> Result<TransferReceipt>;

    /// Pay `amount` out of custody to `to`
    fn disburse(&mut self, to: &AccountId, amount: Decimal) -> Result<TransferReceipt>;

    /// Value currently held
    fn held(&self) -> Decimal;
}

#[derive(Debug, Default)]
struct BankState {
    wallets: HashMap<AccountId, Decimal>,
    held: Decimal,
    failing_disbursements: u32,
    receipts: Vec<TransferReceipt>,
}

/// In-memory bank with participant wallets
///
/// Clones share state, so a test can keep one clone to inspect balances
/// while the ledger owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBank {
    state: Arc<Mutex<BankState>>,
}

impl SimulatedBank {
    /// Empty bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to a participant wallet
    pub fn fund(&self, account: &AccountId, amount: Decimal) {
        let mut state = self.state.lock();
        *state.wallets.entry(account.clone()).or_default() += amount;
    }

    /// Wallet balance of a participant
    pub fn balance_of(&self, account: &AccountId) -> Decimal {
        self.state
            .lock()
            .wallets
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Make the next `count` disbursements fail
    pub fn fail_next_disbursements(&self, count: u32) {
        self.state.lock().failing_disbursements = count;
    }

    /// All executed transfers, oldest first
    pub fn receipts(&self) -> Vec<TransferReceipt> {
        self.state.lock().receipts.clone()
    }

    fn receipt(
        direction: TransferDirection,
        counterparty: &AccountId,
        amount: Decimal,
    ) -> TransferReceipt {
        TransferReceipt {
            reference: format!("SIM-{}", Uuid::now_v7()),
            direction,
            counterparty: counterparty.clone(),
            amount,
            executed_at: Utc::now(),
        }
    }
}

impl Custody for SimulatedBank {
    fn receive(&mut self, from: &AccountId, amount: Decimal) -> Result<TransferReceipt> {
        let mut state = self.state.lock();

        let balance = state.wallets.get(from).copied().unwrap_or_default();
        if balance < amount {
            return Err(Error::TransferFailed(format!(
                "wallet {} holds {}, cannot pay {}",
                from, balance, amount
            )));
        }

        state.wallets.insert(from.clone(), balance - amount);
        state.held += amount;

        let receipt = Self::receipt(TransferDirection::Inbound, from, amount);
        state.receipts.push(receipt.clone());
        tracing::debug!(reference = %receipt.reference, %from, %amount, "Custody received funds");
        Ok(receipt)
    }

    fn disburse(&mut self, to: &AccountId, amount: Decimal) -> Result<TransferReceipt> {
        let mut state = self.state.lock();

        if state.failing_disbursements > 0 {
            state.failing_disbursements -= 1;
            return Err(Error::TransferFailed(format!(
                "simulated failure paying {} to {}",
                amount, to
            )));
        }

        if state.held < amount {
            return Err(Error::TransferFailed(format!(
                "custody holds {}, cannot pay {}",
                state.held, amount
            )));
        }

        state.held -= amount;
        *state.wallets.entry(to.clone()).or_default() += amount;

        let receipt = Self::receipt(TransferDirection::Outbound, to, amount);
        state.receipts.push(receipt.clone());
        tracing::debug!(reference = %receipt.reference, %to, %amount, "Custody disbursed funds");
        Ok(receipt)
    }

    fn held(&self) -> Decimal {
        self.state.lock().held
    }
}
