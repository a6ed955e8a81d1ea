//! Durable account store abstraction.
//!
//! The engine only needs a handful of primitives from the store: a scoped
//! transaction, an exclusive row lock that also reads the balance, a balance
//! write, and commit/rollback. Everything else (schema, pooling, lock-wait
//! limits) belongs to the implementation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use ledgerbank_common::AccountNumber;
use rust_decimal::Decimal;
use thiserror::Error;

pub use memory::{Fault, MemoryStore};
pub use postgres::{PgStore, PgStoreConfig};

/// Failures raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waited too long for another transaction to release a row lock.
    #[error("lock wait timed out on account {0}")]
    LockTimeout(AccountNumber),

    /// A row that was locked in this transaction no longer exists.
    #[error("account {0} disappeared while locked")]
    RowVanished(AccountNumber),

    /// A write was attempted on a row this transaction does not hold.
    #[error("account {0} written without holding its row lock")]
    NotLocked(AccountNumber),

    /// Driver or connection failure.
    #[error("database error: {0}")]
    Database(String),

    /// Failure injected by a test harness.
    #[error("injected fault: {0}")]
    Injected(String),
}

impl StoreError {
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_))
    }
}

/// Result type for store primitives.
pub type StoreResult<T> = Result<T, StoreError>;

/// Factory for scoped transactions.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Cheap liveness probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// One open transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// its writes and releases its locks.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Take an exclusive lock on the account row and return its balance,
    /// or `None` if no such row exists. Waits while another transaction
    /// holds the lock. Locking a row already held by this transaction
    /// returns its staged balance immediately.
    async fn lock_account_for_update(
        &mut self,
        account_number: &AccountNumber,
    ) -> StoreResult<Option<Decimal>>;

    /// Stage a new balance for a row locked by this transaction.
    async fn set_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> StoreResult<()>;

    /// Make every staged write visible at once and release the locks.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard staged writes and release the locks.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
