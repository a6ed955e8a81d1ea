//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use ledgerbank_common::AccountNumber;
use ledgerbank_ledger::store::MemoryStore;
use ledgerbank_ledger::{LedgerEngine, NewAccount, NewUser, Operation, Registry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::metrics::SimulationMetrics;
use crate::scenario::{Scenario, MIN_ACCOUNTS};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub accounts: usize,
    pub initial_balance: Decimal,
    pub workers: usize,
    pub operations: usize,
    pub seed: Option<u64>,
    pub lock_timeout: Duration,
}

/// Outcome of the post-run invariant check.
#[derive(Debug, Clone)]
pub struct Verification {
    /// Sum of all balances after the run.
    pub actual_total: Decimal,
    /// Seeded total plus net committed deposits and withdrawals.
    pub expected_total: Decimal,
    /// Accounts found below zero.
    pub negative_accounts: Vec<(AccountNumber, Decimal)>,
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        self.actual_total == self.expected_total && self.negative_accounts.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    config: SimulationConfig,
    /// Random number generator.
    rng: StdRng,
    store: MemoryStore,
    engine: Arc<LedgerEngine>,
    accounts: Vec<AccountNumber>,
    /// Total placed into accounts during initialization.
    seeded_total: Decimal,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    elapsed: Duration,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: SimulationConfig) -> Self {
        let (rng, store) = match config.seed {
            Some(s) => (
                StdRng::seed_from_u64(s),
                MemoryStore::with_lock_timeout(config.lock_timeout).with_seed(s),
            ),
            None => (
                StdRng::from_entropy(),
                MemoryStore::with_lock_timeout(config.lock_timeout),
            ),
        };
        let engine = Arc::new(LedgerEngine::new(Arc::new(store.clone())));

        Self {
            config,
            rng,
            store,
            engine,
            accounts: Vec::new(),
            seeded_total: Decimal::ZERO,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            elapsed: Duration::ZERO,
        }
    }

    /// Open the accounts and fund them through the engine.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        if self.config.accounts < MIN_ACCOUNTS {
            anyhow::bail!("at least {} accounts are required", MIN_ACCOUNTS);
        }
        if self.config.initial_balance < Decimal::ZERO {
            anyhow::bail!("initial balance cannot be negative");
        }

        info!(accounts = self.config.accounts, "Initializing simulation");

        let user = self.store.create_user(NewUser::new("simulator")).await?;
        for _ in 0..self.config.accounts {
            let account = self.store.create_account(NewAccount::new(user.id)).await?;
            if self.config.initial_balance > Decimal::ZERO {
                self.engine
                    .deposit(&account.account_number, self.config.initial_balance)
                    .await?;
                self.seeded_total += self.config.initial_balance;
            }
            debug!(account = %account.account_number, "Account funded");
            self.accounts.push(account.account_number);
        }

        info!(seeded_total = %self.seeded_total, "Accounts funded");
        Ok(())
    }

    /// Run a scenario to completion.
    pub async fn run_scenario(&mut self, scenario: Scenario) -> anyhow::Result<()> {
        info!(
            scenario = scenario.name(),
            description = scenario.description(),
            operations = self.config.operations,
            workers = self.config.workers,
            "Running scenario"
        );

        // Operations are drawn up front so a seed fixes the workload.
        let workers = self.config.workers.max(1);
        let mut queues: Vec<Vec<Operation>> = vec![Vec::new(); workers];
        for i in 0..self.config.operations {
            let op = scenario.next_operation(&mut self.rng, &self.accounts);
            queues[i % workers].push(op);
        }

        let start = Instant::now();
        let handles = queues.into_iter().map(|queue| {
            let engine = Arc::clone(&self.engine);
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                for op in queue {
                    let began = Instant::now();
                    let result = engine.execute(op.clone()).await;
                    let latency_us = began.elapsed().as_micros() as u64;

                    metrics
                        .write()
                        .await
                        .record(&op, &result.as_ref().map(|_| ()), latency_us);
                }
            })
        });

        for joined in join_all(handles).await {
            joined?;
        }
        self.elapsed = start.elapsed();

        Ok(())
    }

    /// Check non-negativity and conservation over every account.
    pub async fn verify(&self) -> Verification {
        let balances = self.store.balances();
        let metrics = self.metrics.read().await;

        let negative_accounts: Vec<_> = balances
            .iter()
            .filter(|(_, balance)| **balance < Decimal::ZERO)
            .map(|(number, balance)| (number.clone(), *balance))
            .collect();
        for (number, balance) in &negative_accounts {
            warn!(account = %number, balance = %balance, "Negative balance");
        }

        Verification {
            actual_total: balances.values().copied().sum(),
            expected_total: self.seeded_total + metrics.net_inflow(),
            negative_accounts,
        }
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }

    /// Wall time of the last run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Engine counters as Prometheus text.
    pub fn engine_report(&self) -> String {
        self.engine.metrics().to_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(scenario_accounts: usize) -> SimulationConfig {
        SimulationConfig {
            accounts: scenario_accounts,
            initial_balance: dec!(500.00),
            workers: 4,
            operations: 400,
            seed: Some(42),
            lock_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenarios_preserve_invariants() {
        for scenario in [
            Scenario::Mixed,
            Scenario::OpposingTransfers,
            Scenario::HotAccount,
        ] {
            let mut controller = SimulationController::new(config(5));
            controller.initialize().await.unwrap();
            controller.run_scenario(scenario).await.unwrap();

            let verification = controller.verify().await;
            assert!(verification.is_ok(), "{scenario:?}: {verification:?}");

            let metrics = controller.metrics().await;
            assert_eq!(metrics.total_operations, 400);
            assert_eq!(metrics.failed, 0);
        }
    }

    #[tokio::test]
    async fn test_requires_two_accounts() {
        let mut controller = SimulationController::new(config(1));
        assert!(controller.initialize().await.is_err());
    }
}
