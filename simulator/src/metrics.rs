//! Simulation metrics.

use std::collections::VecDeque;

use ledgerbank_ledger::{LedgerError, Operation};
use rust_decimal::Decimal;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Operations committed.
    pub committed: u64,
    /// Operations refused for a caller-side reason.
    pub rejected: u64,
    /// Operations that hit a store failure.
    pub failed: u64,
    /// Refusals caused by an insufficient balance.
    pub insufficient_funds: u64,
    /// Sum of committed deposits.
    pub deposited: Decimal,
    /// Sum of committed withdrawals.
    pub withdrawn: Decimal,
    /// Latency samples (microseconds).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            committed: 0,
            rejected: 0,
            failed: 0,
            insufficient_funds: 0,
            deposited: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record the outcome of one engine call.
    pub fn record(
        &mut self,
        operation: &Operation,
        result: &Result<(), &LedgerError>,
        latency_us: u64,
    ) {
        self.total_operations += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);

        match result {
            Ok(()) => {
                self.committed += 1;
                match operation {
                    Operation::Deposit { amount, .. } => self.deposited += *amount,
                    Operation::Withdraw { amount, .. } => self.withdrawn += *amount,
                    Operation::Transfer { .. } => {}
                }
            }
            Err(LedgerError::StoreFailure(_)) => self.failed += 1,
            Err(err) => {
                if matches!(err, LedgerError::InsufficientFunds { .. }) {
                    self.insufficient_funds += 1;
                }
                self.rejected += 1;
            }
        }
    }

    /// Net money that entered the ledger from outside.
    pub fn net_inflow(&self) -> Decimal {
        self.deposited - self.withdrawn
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }

        self.committed as f64 / self.total_operations as f64
    }

    /// Operations per second over the given wall time.
    pub fn throughput(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }

        self.total_operations as f64 / elapsed_secs
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbank_common::AccountNumber;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();
        let account = AccountNumber::from("1111111111");
        let deposit = Operation::Deposit {
            account: account.clone(),
            amount: dec!(10),
        };
        let withdraw = Operation::Withdraw {
            account: account.clone(),
            amount: dec!(4),
        };
        let shortfall = LedgerError::InsufficientFunds {
            account_number: account,
            requested: dec!(100),
            available: dec!(6),
        };

        metrics.record(&deposit, &Ok(()), 100);
        metrics.record(&withdraw, &Ok(()), 200);
        metrics.record(&withdraw, &Ok(()), 150);
        metrics.record(&withdraw, &Err(&shortfall), 50);

        assert_eq!(metrics.total_operations, 4);
        assert_eq!(metrics.committed, 3);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.insufficient_funds, 1);
        assert_eq!(metrics.net_inflow(), dec!(2));
        assert_eq!(metrics.average_latency_us(), 125);
        assert_eq!(metrics.success_rate(), 0.75);
        assert_eq!(metrics.p99_latency_us(), 200);
    }
}
