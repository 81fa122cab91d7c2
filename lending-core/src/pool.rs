//! Pool ledger: aggregate pooled funds and per-lender accounting
//!
//! The pool only records amounts. Value movement happens through
//! [`crate::custody::Custody`] and is sequenced by the controller.

use crate::{
    policy,
    types::{AccountId, LenderInfo},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative deposit/withdrawal totals for one lender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LenderRecord {
    /// Cumulative deposits (never decreases)
    pub deposited: Decimal,
    /// Cumulative withdrawals (never decreases)
    pub withdrawn: Decimal,
}

impl LenderRecord {
    /// `deposited - withdrawn`
    pub fn available(&self) -> Decimal {
        self.deposited - self.withdrawn
    }
}

/// Pool ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolLedger {
    lenders: BTreeMap<AccountId, LenderRecord>,
    total_pool: Decimal,
}

impl PoolLedger {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Value currently available for disbursement
    pub fn total_pool(&self) -> Decimal {
        self.total_pool
    }

    /// Accounting view for `lender`; zeros when never seen
    pub fn lender_info(&self, lender: &AccountId) -> LenderInfo {
        let record = self.lenders.get(lender).copied().unwrap_or_default();
        LenderInfo {
            deposited: record.deposited,
            withdrawn: record.withdrawn,
            available: record.available(),
        }
    }

    /// Number of lenders that ever deposited
    pub fn lender_count(&self) -> usize {
        self.lenders.len()
    }

    /// Sum of all deposits
    pub fn total_deposited(&self) -> Result<Decimal> {
        policy::checked_sum(self.lenders.values().map(|r| r.deposited), "deposits")
    }

    /// Sum of all withdrawals
    pub fn total_withdrawn(&self) -> Result<Decimal> {
        policy::checked_sum(self.lenders.values().map(|r| r.withdrawn), "withdrawals")
    }

    /// Check a deposit of `amount` by `lender` can be recorded
    pub fn check_deposit(&self, lender: &AccountId, amount: Decimal) -> Result<()> {
        let deposited = self
            .lenders
            .get(lender)
            .map(|r| r.deposited)
            .unwrap_or_default();
        checked_add(deposited, amount, "lender deposits")?;
        self.check_inflow(amount)
    }

    /// Credit a deposit to `lender` and the pool
    pub fn record_deposit(&mut self, lender: &AccountId, amount: Decimal) -> Result<()> {
        self.check_deposit(lender, amount)?;
        let record = self.lenders.entry(lender.clone()).or_default();
        record.deposited += amount;
        self.total_pool += amount;
        Ok(())
    }

    /// Check that `lender` may withdraw `amount` right now
    pub fn check_withdrawal(&self, lender: &AccountId, amount: Decimal) -> Result<()> {
        let available = self.lender_info(lender).available;
        if amount > available {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        self.check_outflow(amount)
    }

    /// Debit a withdrawal from `lender` and the pool
    pub fn record_withdrawal(&mut self, lender: &AccountId, amount: Decimal) -> Result<()> {
        self.check_withdrawal(lender, amount)?;
        let record = self.lenders.entry(lender.clone()).or_default();
        record.withdrawn += amount;
        self.total_pool -= amount;
        Ok(())
    }

    /// Check the pool can cover `amount`
    pub fn check_outflow(&self, amount: Decimal) -> Result<()> {
        if amount > self.total_pool {
            return Err(Error::InsufficientPoolFunds {
                requested: amount,
                available: self.total_pool,
            });
        }
        Ok(())
    }

    /// Remove `amount` from the pool (loan disbursement)
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        self.check_outflow(amount)?;
        self.total_pool -= amount;
        Ok(())
    }

    /// Check the pool can absorb `amount`
    pub fn check_inflow(&self, amount: Decimal) -> Result<()> {
        checked_add(self.total_pool, amount, "pool").map(|_| ())
    }

    /// Add `amount` to the pool (repayment)
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        self.total_pool = checked_add(self.total_pool, amount, "pool")?;
        Ok(())
    }

    pub(crate) fn from_parts(
        total_pool: Decimal,
        lenders: BTreeMap<AccountId, LenderRecord>,
    ) -> Self {
        Self {
            lenders,
            total_pool,
        }
    }

    pub(crate) fn lender_record(&self, lender: &AccountId) -> Option<LenderRecord> {
        self.lenders.get(lender).copied()
    }

    pub(crate) fn restore(
        &mut self,
        total_pool: Decimal,
        lender: Option<(AccountId, Option<LenderRecord>)>,
    ) {
        self.total_pool = total_pool;
        if let Some((id, record)) = lender {
            match record {
                Some(record) => {
                    self.lenders.insert(id, record);
                }
                None => {
                    self.lenders.remove(&id);
                }
            }
        }
    }
}

fn checked_add(lhs: Decimal, rhs: Decimal, what: &str) -> Result<Decimal> {
    lhs.checked_add(rhs)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("{} overflow adding {}", what, rhs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_unknown_lender_is_zeroed() {
        let pool = PoolLedger::new();
        assert_eq!(pool.lender_info(&AccountId::new("nobody")), LenderInfo::default());
        assert_eq!(pool.total_pool(), Decimal::ZERO);
    }

    #[test]
    fn test_deposits_accumulate() {
        let mut pool = PoolLedger::new();
        let lender = AccountId::new("lender1");

        pool.record_deposit(&lender, dec("0.5")).unwrap();
        pool.record_deposit(&lender, dec("0.25")).unwrap();

        let info = pool.lender_info(&lender);
        assert_eq!(info.deposited, dec("0.75"));
        assert_eq!(info.withdrawn, Decimal::ZERO);
        assert_eq!(info.available, dec("0.75"));
        assert_eq!(pool.total_pool(), dec("0.75"));
    }

    #[test]
    fn test_withdrawal_limited_by_balance() {
        let mut pool = PoolLedger::new();
        let lender = AccountId::new("lender1");
        pool.record_deposit(&lender, dec("1.0")).unwrap();

        let err = pool.record_withdrawal(&lender, dec("1.5")).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        pool.record_withdrawal(&lender, dec("0.4")).unwrap();
        let info = pool.lender_info(&lender);
        assert_eq!(info.withdrawn, dec("0.4"));
        assert_eq!(info.available, dec("0.6"));
        assert_eq!(pool.total_pool(), dec("0.6"));
    }

    #[test]
    fn test_withdrawal_limited_by_pool() {
        let mut pool = PoolLedger::new();
        let lender = AccountId::new("lender1");
        pool.record_deposit(&lender, dec("1.0")).unwrap();
        pool.debit(dec("0.8")).unwrap();

        let err = pool.record_withdrawal(&lender, dec("0.5")).unwrap_err();
        assert!(matches!(err, Error::InsufficientPoolFunds { .. }));
        assert_eq!(pool.lender_info(&lender).withdrawn, Decimal::ZERO);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut pool = PoolLedger::new();
        pool.record_deposit(&AccountId::new("l"), dec("0.01")).unwrap();
        assert!(pool.debit(dec("0.02")).is_err());
        assert_eq!(pool.total_pool(), dec("0.01"));
    }

    #[test]
    fn test_overflowing_deposit_leaves_no_record() {
        let mut pool = PoolLedger::new();
        pool.record_deposit(&AccountId::new("whale"), Decimal::MAX).unwrap();

        let minnow = AccountId::new("minnow");
        let err = pool.record_deposit(&minnow, dec("1")).unwrap_err();
        assert!(matches!(err, Error::ArithmeticOverflow(_)));
        assert_eq!(pool.lender_record(&minnow), None);
        assert_eq!(pool.lender_count(), 1);
    }

    #[test]
    fn test_totals_report_overflow() {
        let mut pool = PoolLedger::new();
        let half = Decimal::MAX / Decimal::TWO + Decimal::ONE;
        let first = AccountId::new("first");
        pool.record_deposit(&first, half).unwrap();
        pool.record_withdrawal(&first, half).unwrap();
        pool.record_deposit(&AccountId::new("second"), half).unwrap();

        assert!(matches!(
            pool.total_deposited(),
            Err(Error::ArithmeticOverflow(_))
        ));
        assert_eq!(pool.total_withdrawn().unwrap(), half);
    }

    #[test]
    fn test_restore_removes_new_lender() {
        let mut pool = PoolLedger::new();
        let lender = AccountId::new("fresh");
        let before = pool.total_pool();
        let record = pool.lender_record(&lender);

        pool.record_deposit(&lender, dec("0.3")).unwrap();
        pool.restore(before, Some((lender.clone(), record)));

        assert_eq!(pool, PoolLedger::new());
    }
}
