//! Loan bounds and flat-rate interest

use crate::{config::LoanConfig, Error, Result};
use rust_decimal::Decimal;

const BPS_DENOMINATOR: i64 = 10_000;

/// Loan policy checker
#[derive(Debug, Clone)]
pub struct LoanPolicy {
    config: LoanConfig,
}

impl LoanPolicy {
    /// Create new policy
    pub fn new(config: LoanConfig) -> Self {
        Self { config }
    }

    /// Rate applied to new requests (basis points)
    pub fn interest_rate_bps(&self) -> u32 {
        self.config.interest_rate_bps
    }

    /// Check a requested principal against `[min_loan, max_loan]`
    pub fn check_amount(&self, amount: Decimal) -> Result<()> {
        if amount < self.config.min_loan || amount > self.config.max_loan {
            return Err(Error::InvalidLoanAmount {
                amount,
                min: self.config.min_loan,
                max: self.config.max_loan,
            });
        }
        Ok(())
    }
}

/// Sum `values`, failing instead of panicking on overflow
pub fn checked_sum<I>(values: I, what: &str) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, |total, value| {
        total
            .checked_add(value)
            .ok_or_else(|| Error::ArithmeticOverflow(format!("{} total overflow", what)))
    })
}

/// Flat interest on `principal` at `rate_bps`
pub fn interest_for(principal: Decimal, rate_bps: u32) -> Result<Decimal> {
    principal
        .checked_mul(Decimal::from(rate_bps))
        .and_then(|scaled| scaled.checked_div(Decimal::from(BPS_DENOMINATOR)))
        .ok_or_else(|| Error::ArithmeticOverflow(format!("interest on {}", principal)))
}

/// Principal plus flat interest
pub fn repayment_amount(principal: Decimal, rate_bps: u32) -> Result<Decimal> {
    let interest = interest_for(principal, rate_bps)?;
    principal
        .checked_add(interest)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("repayment on {}", principal)))
}
