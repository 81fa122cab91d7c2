//! Loan registry and lifecycle state machine
//!
//! ```text
//! request_loan        approve_loan        repay_loan
//!     │                    │                   │
//!     ▼                    ▼                   ▼
//! Requested ─────────▶ Active ─────────▶ Repaid
//! ```
//!
//! Records are never removed and ids are never reused.

use crate::{
    policy,
    types::{AccountId, LoanDetails, LoanId, LoanRecord, LoanStatus},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Loan registry
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRegistry {
    loans: BTreeMap<LoanId, LoanRecord>,
    next_id: LoanId,
}

impl Default for LoanRegistry {
    fn default() -> Self {
        Self {
            loans: BTreeMap::new(),
            next_id: LoanId::FIRST,
        }
    }
}

impl LoanRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next request will receive
    pub fn next_id(&self) -> LoanId {
        self.next_id
    }

    /// Record a new request in `Requested` state
    pub fn create(
        &mut self,
        borrower: AccountId,
        principal: Decimal,
        interest_rate_bps: u32,
        now: DateTime<Utc>,
    ) -> LoanId {
        let loan_id = self.next_id;
        self.next_id = loan_id.next();

        self.loans.insert(
            loan_id,
            LoanRecord {
                loan_id,
                borrower,
                principal,
                interest_rate_bps,
                status: LoanStatus::Requested,
                created_at: now,
                approved_at: None,
                repaid_at: None,
            },
        );

        loan_id
    }

    /// Look up a loan
    pub fn get(&self, loan_id: LoanId) -> Result<&LoanRecord> {
        self.loans.get(&loan_id).ok_or(Error::LoanNotFound(loan_id))
    }

    /// Principal plus interest for `loan_id`, in any state
    pub fn repayment_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        let loan = self.get(loan_id)?;
        policy::repayment_amount(loan.principal, loan.interest_rate_bps)
    }

    /// Named projection of a loan
    pub fn details(&self, loan_id: LoanId) -> Result<LoanDetails> {
        let loan = self.get(loan_id)?;
        Ok(LoanDetails {
            loan_id,
            borrower: loan.borrower.clone(),
            principal: loan.principal,
            interest_rate_bps: loan.interest_rate_bps,
            repayment_amount: policy::repayment_amount(loan.principal, loan.interest_rate_bps)?,
            created_at: loan.created_at,
            approved_at: loan.approved_at,
            repaid_at: loan.repaid_at,
            approved: loan.approved(),
            active: loan.active(),
            repaid: loan.repaid(),
        })
    }

    /// Check `loan_id` can move `Requested → Active`
    pub fn check_approvable(&self, loan_id: LoanId) -> Result<&LoanRecord> {
        let loan = self.get(loan_id)?;
        if loan.status != LoanStatus::Requested {
            return Err(Error::LoanAlreadyApproved(loan_id));
        }
        Ok(loan)
    }

    /// Check `loan_id` can move `Active → Repaid`
    pub fn check_repayable(&self, loan_id: LoanId) -> Result<&LoanRecord> {
        let loan = self.get(loan_id)?;
        match loan.status {
            LoanStatus::Active => Ok(loan),
            LoanStatus::Requested => Err(Error::LoanNotActive(loan_id)),
            LoanStatus::Repaid => Err(Error::LoanAlreadyRepaid(loan_id)),
        }
    }

    /// `Requested → Active`
    pub fn mark_approved(&mut self, loan_id: LoanId, now: DateTime<Utc>) -> Result<()> {
        self.check_approvable(loan_id)?;
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(Error::LoanNotFound(loan_id))?;
        loan.status = LoanStatus::Active;
        loan.approved_at = Some(now);
        Ok(())
    }

    /// `Active → Repaid`
    pub fn mark_repaid(&mut self, loan_id: LoanId, now: DateTime<Utc>) -> Result<()> {
        self.check_repayable(loan_id)?;
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(Error::LoanNotFound(loan_id))?;
        loan.status = LoanStatus::Repaid;
        loan.repaid_at = Some(now);
        Ok(())
    }

    /// All loans requested by `borrower`, oldest first
    pub fn for_borrower(&self, borrower: &AccountId) -> Vec<LoanDetails> {
        self.loans
            .keys()
            .filter(|id| self.loans[id].borrower == *borrower)
            .filter_map(|id| self.details(*id).ok())
            .collect()
    }

    /// Number of loans in `status`
    pub fn count(&self, status: LoanStatus) -> usize {
        self.loans.values().filter(|l| l.status == status).count()
    }

    /// Principal disbursed and not yet repaid
    pub fn outstanding_principal(&self) -> Result<Decimal> {
        policy::checked_sum(
            self.loans
                .values()
                .filter(|l| l.active())
                .map(|l| l.principal),
            "outstanding principal",
        )
    }

    /// Interest received from settled loans
    pub fn interest_collected(&self) -> Result<Decimal> {
        let interest = self
            .loans
            .values()
            .filter(|l| l.repaid())
            .map(|l| policy::interest_for(l.principal, l.interest_rate_bps))
            .collect::<Result<Vec<_>>>()?;
        policy::checked_sum(interest, "interest")
    }

    /// Rebuild from persisted records
    ///
    /// `next_id` never falls behind an existing record.
    pub(crate) fn from_parts(records: Vec<LoanRecord>, next_id: LoanId) -> Self {
        let loans: BTreeMap<LoanId, LoanRecord> = records
            .into_iter()
            .map(|record| (record.loan_id, record))
            .collect();
        let next_id = loans
            .keys()
            .next_back()
            .map(|last| last.next())
            .filter(|after_last| *after_last > next_id)
            .unwrap_or(next_id);
        Self { loans, next_id }
    }

    pub(crate) fn restore(&mut self, record: LoanRecord) {
        self.loans.insert(record.loan_id, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn registry_with_loan() -> (LoanRegistry, LoanId) {
        let mut registry = LoanRegistry::new();
        let id = registry.create(AccountId::new("borrower1"), dec("0.05"), 500, Utc::now());
        (registry, id)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut registry = LoanRegistry::new();
        let borrower = AccountId::new("b");
        let first = registry.create(borrower.clone(), dec("0.01"), 500, Utc::now());
        let second = registry.create(borrower, dec("0.02"), 500, Utc::now());

        assert_eq!(first, LoanId::FIRST);
        assert_eq!(second, LoanId::new(2));
        assert_eq!(registry.next_id(), LoanId::new(3));
    }

    #[test]
    fn test_new_loan_is_requested() {
        let (registry, id) = registry_with_loan();
        let details = registry.details(id).unwrap();
        assert!(!details.approved);
        assert!(!details.active);
        assert!(!details.repaid);
        assert_eq!(details.repayment_amount, dec("0.0525"));
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut registry, id) = registry_with_loan();

        registry.mark_approved(id, Utc::now()).unwrap();
        assert!(registry.get(id).unwrap().active());
        assert_eq!(registry.outstanding_principal().unwrap(), dec("0.05"));

        registry.mark_repaid(id, Utc::now()).unwrap();
        let loan = registry.get(id).unwrap();
        assert!(loan.repaid() && !loan.active());
        assert!(loan.repaid_at.is_some());
        assert_eq!(registry.outstanding_principal().unwrap(), Decimal::ZERO);
        assert_eq!(registry.interest_collected().unwrap(), dec("0.0025"));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        let (mut registry, id) = registry_with_loan();

        assert!(matches!(
            registry.mark_repaid(id, Utc::now()),
            Err(Error::LoanNotActive(_))
        ));

        registry.mark_approved(id, Utc::now()).unwrap();
        assert!(matches!(
            registry.mark_approved(id, Utc::now()),
            Err(Error::LoanAlreadyApproved(_))
        ));

        registry.mark_repaid(id, Utc::now()).unwrap();
        assert!(matches!(
            registry.mark_repaid(id, Utc::now()),
            Err(Error::LoanAlreadyRepaid(_))
        ));
        assert!(matches!(
            registry.mark_approved(id, Utc::now()),
            Err(Error::LoanAlreadyApproved(_))
        ));
    }

    #[test]
    fn test_unknown_loan() {
        let registry = LoanRegistry::new();
        assert!(matches!(
            registry.repayment_amount(LoanId::new(7)),
            Err(Error::LoanNotFound(_))
        ));
    }

    #[test]
    fn test_for_borrower_filters() {
        let mut registry = LoanRegistry::new();
        registry.create(AccountId::new("a"), dec("0.01"), 500, Utc::now());
        registry.create(AccountId::new("b"), dec("0.02"), 500, Utc::now());
        registry.create(AccountId::new("a"), dec("0.03"), 500, Utc::now());

        let loans = registry.for_borrower(&AccountId::new("a"));
        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].loan_id, LoanId::new(1));
        assert_eq!(loans[1].loan_id, LoanId::new(3));
        assert_eq!(registry.count(LoanStatus::Requested), 3);
    }

    #[test]
    fn test_from_parts_keeps_ids_monotonic() {
        let mut registry = LoanRegistry::new();
        registry.create(AccountId::new("a"), dec("0.01"), 500, Utc::now());
        registry.create(AccountId::new("b"), dec("0.02"), 500, Utc::now());
        let records: Vec<LoanRecord> = (1..=2)
            .map(|id| registry.get(LoanId::new(id)).unwrap().clone())
            .collect();

        // A stale counter is moved past the last stored loan
        let rebuilt = LoanRegistry::from_parts(records, LoanId::FIRST);
        assert_eq!(rebuilt.next_id(), LoanId::new(3));
        assert_eq!(rebuilt, registry);
    }
}
