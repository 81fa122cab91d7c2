//! Lending node binary
//!
//! Opens a ledger against an in-memory bank and walks one loan through its
//! lifecycle, printing the resulting journal as JSON.

use anyhow::Context;
use lending_core::{AccountId, Config, Ledger, SimulatedBank};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting lending node");

    // Load configuration
    let config = match std::env::var("LENDING_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("failed to load config from environment")?,
    };
    let owner = config.owner.clone();

    let lender = AccountId::new("lender1");
    let borrower = AccountId::new("borrower1");
    let bank = SimulatedBank::new();
    bank.fund(&lender, Decimal::ONE);
    bank.fund(&borrower, Decimal::new(1, 2));

    let ledger = Ledger::open(config, bank.clone()).await?;
    tracing::info!("Ledger opened successfully");

    ledger.deposit_to_pool(lender.clone(), Decimal::new(1, 1)).await?;
    let loan_id = ledger
        .request_loan(borrower.clone(), Decimal::new(1, 2))
        .await?;
    ledger.approve_loan(owner, loan_id).await?;

    let details = ledger.get_loan_details(loan_id).await?;
    let due = ledger.calculate_repayment_amount(loan_id).await?;
    tracing::info!(
        loan_id = %loan_id,
        principal = %details.principal,
        due = %due,
        borrower_balance = %bank.balance_of(&borrower),
        "Loan disbursed"
    );

    let receipt = ledger.repay_loan(borrower.clone(), loan_id, due).await?;
    tracing::info!(
        loan_id = %receipt.loan_id,
        paid = %receipt.amount_paid,
        pool = %ledger.total_pool().await?,
        "Loan repaid"
    );

    if let Err(e) = ledger.check_conservation().await {
        tracing::warn!("Conservation check failed: {}", e);
    }

    let stats = ledger.pool_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for record in ledger.events_since(0).await? {
        println!("{}", serde_json::to_string(&record)?);
    }

    tracing::info!("Shutting down lending node");
    ledger.shutdown().await?;
    Ok(())
}
