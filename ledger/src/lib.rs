//! LedgerBank Ledger Engine
//!
//! Moves money between accounts with all-or-nothing semantics on top of a
//! durable account store that provides row-level exclusive locks.
//!
//! The [`LedgerEngine`] owns no mutable state of its own: every operation opens
//! one store transaction, locks the rows it touches in ascending
//! account-number order, validates, writes and commits, or rolls back.

pub mod account;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod registry;
pub mod store;

pub use account::{Account, AccountType, NewAccount, NewUser, User};
pub use engine::{BalanceUpdate, LedgerEngine, OperationOutcome};
pub use error::{AccountRole, LedgerError, LedgerResult};
pub use metrics::{EngineMetrics, MetricsSnapshot, SharedMetrics};
pub use operation::{Operation, OperationKind};
pub use registry::Registry;
pub use store::{AccountStore, StoreError, StoreResult, StoreTransaction};
