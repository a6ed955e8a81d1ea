//! LedgerBank Simulator
//!
//! Drives concurrent operation mixes through the ledger engine and checks
//! that no balance went negative and no money appeared or vanished.

use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use controller::{SimulationConfig, SimulationController};
use scenario::Scenario;

/// LedgerBank Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "ledgerbank-simulator")]
#[command(about = "Concurrency and conservation checks for the LedgerBank engine")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "8")]
    accounts: usize,

    /// Balance deposited into each account before the run
    #[arg(long, default_value = "1000.00")]
    initial_balance: Decimal,

    /// Concurrent worker tasks
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total operations across all workers
    #[arg(short, long, default_value = "10000")]
    operations: usize,

    /// Scenario to run: mixed, opposing-transfers, hot-account
    #[arg(short, long, default_value = "mixed")]
    scenario: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Row lock wait limit in milliseconds
    #[arg(long, default_value = "5000")]
    lock_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let scenario = Scenario::load(&args.scenario)?;

    info!(
        accounts = args.accounts,
        workers = args.workers,
        operations = args.operations,
        seed = ?args.seed,
        "Starting LedgerBank simulator"
    );

    let mut controller = SimulationController::new(SimulationConfig {
        accounts: args.accounts,
        initial_balance: args.initial_balance,
        workers: args.workers,
        operations: args.operations,
        seed: args.seed,
        lock_timeout: Duration::from_millis(args.lock_timeout_ms),
    });

    controller.initialize().await?;
    controller.run_scenario(scenario).await?;

    let metrics = controller.metrics().await;
    let elapsed = controller.elapsed().as_secs_f64();
    info!(
        total = metrics.total_operations,
        committed = metrics.committed,
        rejected = metrics.rejected,
        insufficient_funds = metrics.insufficient_funds,
        failed = metrics.failed,
        success_rate = metrics.success_rate(),
        throughput = metrics.throughput(elapsed),
        avg_latency_us = metrics.average_latency_us(),
        p50_latency_us = metrics.p50_latency_us(),
        p99_latency_us = metrics.p99_latency_us(),
        "Simulation complete"
    );

    let verification = controller.verify().await;
    if !verification.is_ok() {
        error!(
            actual_total = %verification.actual_total,
            expected_total = %verification.expected_total,
            negative_accounts = verification.negative_accounts.len(),
            "Ledger invariants violated"
        );
        anyhow::bail!("ledger invariants violated");
    }

    info!(total = %verification.actual_total, "Invariants hold");
    println!("{}", controller.engine_report());

    Ok(())
}
