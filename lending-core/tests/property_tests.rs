//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Pool conservation holds after every operation, accepted or rejected
//! - Loan requests succeed exactly when the amount is within bounds
//! - Loan ids strictly increase
//! - Repayment never falls below principal
//! - Rejected operations leave state untouched

use lending_core::{
    custody::SimulatedBank, AccountId, Config, Error, LedgerController, LoanId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const LENDERS: [&str; 3] = ["lender-a", "lender-b", "lender-c"];
const BORROWERS: [&str; 3] = ["borrower-a", "borrower-b", "borrower-c"];

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, Decimal),
    Withdraw(usize, Decimal),
    Request(usize, Decimal),
    Approve(u64),
    Repay(u64),
}

/// Strategy for generating amounts with three decimal places
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..2_000i64).prop_map(|milli| Decimal::new(milli, 3))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..LENDERS.len(), amount_strategy()).prop_map(|(i, a)| Op::Deposit(i, a)),
        (0..LENDERS.len(), amount_strategy()).prop_map(|(i, a)| Op::Withdraw(i, a)),
        (0..BORROWERS.len(), amount_strategy()).prop_map(|(i, a)| Op::Request(i, a)),
        (1u64..12).prop_map(Op::Approve),
        (1u64..12).prop_map(Op::Repay),
    ]
}

/// Controller with every participant funded well beyond any generated amount
fn create_test_controller() -> (LedgerController, SimulatedBank) {
    let bank = SimulatedBank::new();
    for name in LENDERS.iter().chain(BORROWERS.iter()) {
        bank.fund(&AccountId::new(*name), Decimal::from(1_000));
    }
    let controller = LedgerController::new(&Config::default(), Box::new(bank.clone()));
    (controller, bank)
}

fn apply(controller: &mut LedgerController, op: &Op) -> Result<(), Error> {
    let owner = AccountId::new("owner");
    match op {
        Op::Deposit(i, amount) => controller.deposit_to_pool(&AccountId::new(LENDERS[*i]), *amount),
        Op::Withdraw(i, amount) => {
            controller.withdraw_from_pool(&AccountId::new(LENDERS[*i]), *amount)
        }
        Op::Request(i, amount) => controller
            .request_loan(&AccountId::new(BORROWERS[*i]), *amount)
            .map(|_| ()),
        Op::Approve(id) => controller.approve_loan(&owner, LoanId::new(*id)),
        Op::Repay(id) => {
            let loan_id = LoanId::new(*id);
            let details = controller.get_loan_details(loan_id)?;
            let due = controller.calculate_repayment_amount(loan_id)?;
            controller
                .repay_loan(&details.borrower, loan_id, due)
                .map(|_| ())
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: pool conservation holds after any operation sequence
    #[test]
    fn prop_pool_conservation(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (mut controller, _bank) = create_test_controller();

        for op in &ops {
            let _ = apply(&mut controller, op);
            prop_assert!(controller.check_conservation().is_ok(), "violated after {:?}", op);
            prop_assert!(controller.total_pool() >= Decimal::ZERO);
        }
    }

    /// Property: a request succeeds iff the amount is within bounds
    #[test]
    fn prop_request_bounds(milli in 0i64..250i64) {
        let (mut controller, _bank) = create_test_controller();
        let amount = Decimal::new(milli, 3);
        let in_bounds = amount >= Decimal::new(1, 3) && amount <= Decimal::new(1, 1);

        let result = controller.request_loan(&AccountId::new("borrower-a"), amount);
        if in_bounds {
            prop_assert_eq!(result.unwrap(), LoanId::new(1));
        } else {
            let is_invalid = matches!(result, Err(Error::InvalidLoanAmount { .. }));
            prop_assert!(is_invalid);
            prop_assert!(controller.get_loan_details(LoanId::new(1)).is_err());
        }
    }

    /// Property: loan ids strictly increase, starting at 1
    #[test]
    fn prop_loan_ids_increase(amounts in prop::collection::vec(1i64..=100i64, 1..30)) {
        let (mut controller, _bank) = create_test_controller();

        let mut previous = 0u64;
        for milli in amounts {
            let id = controller
                .request_loan(&AccountId::new("borrower-b"), Decimal::new(milli, 3))
                .unwrap();
            prop_assert!(id.get() > previous);
            previous = id.get();
        }
        prop_assert_eq!(controller.loans_for(&AccountId::new("borrower-b")).len() as u64, previous);
    }

    /// Property: repayment is at least principal, and exactly principal + 5%
    #[test]
    fn prop_repayment_covers_principal(milli in 1i64..=100i64) {
        let (mut controller, _bank) = create_test_controller();
        let principal = Decimal::new(milli, 3);
        let id = controller.request_loan(&AccountId::new("borrower-c"), principal).unwrap();

        let due = controller.calculate_repayment_amount(id).unwrap();
        prop_assert!(due >= principal);
        prop_assert_eq!(due, principal * Decimal::new(105, 2));
    }

    /// Property: approving twice disburses once
    #[test]
    fn prop_double_approval_disburses_once(milli in 1i64..=100i64) {
        let (mut controller, bank) = create_test_controller();
        let owner = AccountId::new("owner");
        let borrower = AccountId::new("borrower-a");
        controller.deposit_to_pool(&AccountId::new("lender-a"), Decimal::ONE).unwrap();

        let principal = Decimal::new(milli, 3);
        let id = controller.request_loan(&borrower, principal).unwrap();
        let before = bank.balance_of(&borrower);

        controller.approve_loan(&owner, id).unwrap();
        let second = controller.approve_loan(&owner, id);
        let already_approved = matches!(second, Err(Error::LoanAlreadyApproved(_)));
        prop_assert!(already_approved);

        prop_assert_eq!(controller.total_pool(), Decimal::ONE - principal);
        prop_assert_eq!(bank.balance_of(&borrower), before + principal);
    }

    /// Property: approval beyond the pool is rejected without side effects
    #[test]
    fn prop_insufficient_pool_is_noop(deposit in 1i64..100i64, milli in 1i64..=100i64) {
        prop_assume!(milli > deposit);
        let (mut controller, bank) = create_test_controller();
        let borrower = AccountId::new("borrower-a");
        controller
            .deposit_to_pool(&AccountId::new("lender-a"), Decimal::new(deposit, 3))
            .unwrap();
        let id = controller.request_loan(&borrower, Decimal::new(milli, 3)).unwrap();

        let pool_before = controller.total_pool();
        let wallet_before = bank.balance_of(&borrower);
        let result = controller.approve_loan(&AccountId::new("owner"), id);

        let insufficient = matches!(result, Err(Error::InsufficientPoolFunds { .. }));
        prop_assert!(insufficient);
        prop_assert_eq!(controller.total_pool(), pool_before);
        prop_assert_eq!(bank.balance_of(&borrower), wallet_before);
        prop_assert!(!controller.get_loan_details(id).unwrap().approved);
    }
}
