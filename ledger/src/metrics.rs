//! Counters for engine monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::operation::OperationKind;

/// Engine metrics.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Operations that passed validation and opened a transaction.
    pub operations_started: AtomicU64,
    /// Operations committed.
    pub operations_committed: AtomicU64,
    /// Operations refused for a caller-side reason.
    pub operations_rejected: AtomicU64,
    /// Operations that hit a store failure.
    pub operations_failed: AtomicU64,
    /// Committed deposits.
    pub deposits: AtomicU64,
    /// Committed withdrawals.
    pub withdrawals: AtomicU64,
    /// Committed transfers.
    pub transfers: AtomicU64,
    /// Transactions rolled back.
    pub rollbacks: AtomicU64,
    /// Row lock waits that timed out.
    pub lock_timeouts: AtomicU64,
}

impl EngineMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            operations_started: AtomicU64::new(0),
            operations_committed: AtomicU64::new(0),
            operations_rejected: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            deposits: AtomicU64::new(0),
            withdrawals: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
        }
    }

    /// Record an operation that passed validation.
    pub fn operation_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a commit.
    pub fn operation_committed(&self, kind: OperationKind) {
        self.operations_committed.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            OperationKind::Deposit => &self.deposits,
            OperationKind::Withdraw => &self.withdrawals,
            OperationKind::Transfer => &self.transfers,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a caller-side rejection.
    pub fn operation_rejected(&self) {
        self.operations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a store failure.
    pub fn operation_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rollback.
    pub fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record lock timeout.
    pub fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_started: self.operations_started.load(Ordering::Relaxed),
            operations_committed: self.operations_committed.load(Ordering::Relaxed),
            operations_rejected: self.operations_rejected.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            deposits: self.deposits.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP ledgerbank_operations_started Operations that opened a transaction
# TYPE ledgerbank_operations_started counter
ledgerbank_operations_started {}

# HELP ledgerbank_operations_committed Operations committed
# TYPE ledgerbank_operations_committed counter
ledgerbank_operations_committed {}

# HELP ledgerbank_operations_rejected Operations rejected for a client-side reason
# TYPE ledgerbank_operations_rejected counter
ledgerbank_operations_rejected {}

# HELP ledgerbank_operations_failed Operations that hit a store failure
# TYPE ledgerbank_operations_failed counter
ledgerbank_operations_failed {}

# HELP ledgerbank_deposits_total Committed deposits
# TYPE ledgerbank_deposits_total counter
ledgerbank_deposits_total {}

# HELP ledgerbank_withdrawals_total Committed withdrawals
# TYPE ledgerbank_withdrawals_total counter
ledgerbank_withdrawals_total {}

# HELP ledgerbank_transfers_total Committed transfers
# TYPE ledgerbank_transfers_total counter
ledgerbank_transfers_total {}

# HELP ledgerbank_rollbacks_total Transactions rolled back
# TYPE ledgerbank_rollbacks_total counter
ledgerbank_rollbacks_total {}

# HELP ledgerbank_lock_timeouts_total Row lock waits that timed out
# TYPE ledgerbank_lock_timeouts_total counter
ledgerbank_lock_timeouts_total {}
"#,
            snapshot.operations_started,
            snapshot.operations_committed,
            snapshot.operations_rejected,
            snapshot.operations_failed,
            snapshot.deposits,
            snapshot.withdrawals,
            snapshot.transfers,
            snapshot.rollbacks,
            snapshot.lock_timeouts,
        )
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations_started: u64,
    pub operations_committed: u64,
    pub operations_rejected: u64,
    pub operations_failed: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub transfers: u64,
    pub rollbacks: u64,
    pub lock_timeouts: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<EngineMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = EngineMetrics::new();

        metrics.operation_started();
        metrics.operation_started();
        metrics.operation_committed(OperationKind::Transfer);
        metrics.operation_rejected();
        metrics.rollback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_started, 2);
        assert_eq!(snapshot.operations_committed, 1);
        assert_eq!(snapshot.transfers, 1);
        assert_eq!(snapshot.deposits, 0);
        assert_eq!(snapshot.operations_rejected, 1);
        assert_eq!(snapshot.rollbacks, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = EngineMetrics::new();
        metrics.operation_committed(OperationKind::Deposit);

        let output = metrics.to_prometheus();
        assert!(output.contains("ledgerbank_operations_committed 1"));
        assert!(output.contains("ledgerbank_deposits_total 1"));
    }
}
