//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `lending_deposits_total` - Committed deposits
//! - `lending_withdrawals_total` - Committed withdrawals
//! - `lending_loans_requested_total` - Loan requests recorded
//! - `lending_loans_approved_total` - Loans approved and disbursed
//! - `lending_loans_repaid_total` - Loans settled
//! - `lending_rejected_operations_total{reason}` - Failed operations by error kind
//! - `lending_persist_failures_total` - Storage writes that failed after commit
//! - `lending_pool_balance` - Current pool balance
//! - `lending_operation_duration_seconds` - Histogram of command latencies

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed deposits
    pub deposits_total: IntCounter,

    /// Committed withdrawals
    pub withdrawals_total: IntCounter,

    /// Loan requests recorded
    pub loans_requested_total: IntCounter,

    /// Loans approved
    pub loans_approved_total: IntCounter,

    /// Loans repaid
    pub loans_repaid_total: IntCounter,

    /// Failed operations by error kind
    pub rejected_total: IntCounterVec,

    /// Storage write failures
    pub persist_failures_total: IntCounter,

    /// Current pool balance
    pub pool_balance: Gauge,

    /// Command latency histogram
    pub operation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("deposits_total", &self.deposits_total.get())
            .field("loans_approved_total", &self.loans_approved_total.get())
            .field("pool_balance", &self.pool_balance.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total = IntCounter::new("lending_deposits_total", "Committed deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("lending_withdrawals_total", "Committed withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let loans_requested_total =
            IntCounter::new("lending_loans_requested_total", "Loan requests recorded")?;
        registry.register(Box::new(loans_requested_total.clone()))?;

        let loans_approved_total =
            IntCounter::new("lending_loans_approved_total", "Loans approved and disbursed")?;
        registry.register(Box::new(loans_approved_total.clone()))?;

        let loans_repaid_total = IntCounter::new("lending_loans_repaid_total", "Loans settled")?;
        registry.register(Box::new(loans_repaid_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "lending_rejected_operations_total",
                "Failed operations by error kind",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let persist_failures_total = IntCounter::new(
            "lending_persist_failures_total",
            "Storage writes that failed after commit",
        )?;
        registry.register(Box::new(persist_failures_total.clone()))?;

        let pool_balance = Gauge::new("lending_pool_balance", "Current pool balance")?;
        registry.register(Box::new(pool_balance.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "lending_operation_duration_seconds",
                "Histogram of command latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            deposits_total,
            withdrawals_total,
            loans_requested_total,
            loans_approved_total,
            loans_repaid_total,
            rejected_total,
            persist_failures_total,
            pool_balance,
            operation_duration,
            registry,
        })
    }

    /// Record a failed operation
    pub fn record_rejection(&self, reason: &str) {
        self.rejected_total.with_label_values(&[reason]).inc();
    }

    /// Update pool balance gauge
    pub fn set_pool_balance(&self, balance: Decimal) {
        self.pool_balance.set(balance.to_f64().unwrap_or(f64::NAN));
    }

    /// Record command duration
    pub fn record_duration(&self, duration_seconds: f64) {
        self.operation_duration.observe(duration_seconds);
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
