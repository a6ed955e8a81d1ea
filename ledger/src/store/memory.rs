//! In-process account store.
//!
//! Each account row carries an async mutex that plays the role of the
//! database row lock. Writes are staged in the transaction and applied on
//! commit while holding a store-wide gate, so readers see either none or all
//! of a transaction's writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use ledgerbank_common::{AccountId, AccountNumber, Currency, UserId};

use crate::account::{Account, AccountType, NewAccount, NewUser, User};
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::registry::{Registry, ACCOUNT_NUMBER_ATTEMPTS};
use crate::store::{AccountStore, StoreError, StoreResult, StoreTransaction};

/// Default time a transaction waits for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure points that tests can arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Opening a transaction fails.
    Begin,
    /// Locking the given account fails.
    Lock(AccountNumber),
    /// Writing the given account's balance fails.
    SetBalance(AccountNumber),
    /// Commit fails; the transaction is discarded.
    Commit,
}

struct AccountRow {
    lock: Arc<tokio::sync::Mutex<()>>,
    account: RwLock<Account>,
}

struct Inner {
    accounts: DashMap<AccountNumber, Arc<AccountRow>>,
    users: DashMap<UserId, User>,
    usernames: DashMap<String, UserId>,
    next_user_id: AtomicI64,
    next_account_id: AtomicI64,
    commit_gate: RwLock<()>,
    faults: Mutex<Vec<Fault>>,
    rng: Mutex<StdRng>,
    lock_timeout: Duration,
}

impl Inner {
    fn check(&self, fault: &Fault) -> StoreResult<()> {
        if self.faults.lock().contains(fault) {
            return Err(StoreError::Injected(format!("{fault:?}")));
        }
        Ok(())
    }

    fn row(&self, account_number: &AccountNumber) -> Option<Arc<AccountRow>> {
        self.accounts.get(account_number).map(|row| row.clone())
    }
}

/// Account store kept entirely in memory.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose transactions give up waiting for a row
    /// lock after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                accounts: DashMap::new(),
                users: DashMap::new(),
                usernames: DashMap::new(),
                next_user_id: AtomicI64::new(1),
                next_account_id: AtomicI64::new(1),
                commit_gate: RwLock::new(()),
                faults: Mutex::new(Vec::new()),
                rng: Mutex::new(StdRng::from_entropy()),
                lock_timeout,
            }),
        }
    }

    /// Seed the account-number generator for reproducible runs.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.inner.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Open a zero-balance account under an externally issued number.
    pub fn open_account(
        &self,
        user_id: UserId,
        account_number: AccountNumber,
    ) -> LedgerResult<Account> {
        if !self.inner.users.contains_key(&user_id) {
            return Err(LedgerError::InvalidRequest(format!(
                "user {user_id} does not exist"
            )));
        }

        match self.inner.accounts.entry(account_number.clone()) {
            Entry::Occupied(_) => Err(LedgerError::InvalidRequest(format!(
                "account number {account_number} is already in use"
            ))),
            Entry::Vacant(slot) => {
                let account = self.new_account_record(
                    user_id,
                    account_number,
                    Currency::default(),
                    AccountType::default(),
                );
                slot.insert(Arc::new(AccountRow {
                    lock: Arc::new(tokio::sync::Mutex::new(())),
                    account: RwLock::new(account.clone()),
                }));
                Ok(account)
            }
        }
    }

    /// Arm a failure point.
    pub fn inject(&self, fault: Fault) {
        self.inner.faults.lock().push(fault);
    }

    /// Disarm every failure point.
    pub fn clear_faults(&self) {
        self.inner.faults.lock().clear();
    }

    /// Committed balance of an account, if it exists.
    pub fn balance(&self, account_number: &AccountNumber) -> Option<Decimal> {
        let row = self.inner.row(account_number)?;
        let _gate = self.inner.commit_gate.read();
        let balance = row.account.read().balance;
        Some(balance)
    }

    /// Consistent view of every committed balance.
    pub fn balances(&self) -> BTreeMap<AccountNumber, Decimal> {
        let _gate = self.inner.commit_gate.read();
        self.inner
            .accounts
            .iter()
            .map(|row| (row.key().clone(), row.account.read().balance))
            .collect()
    }

    fn new_account_record(
        &self,
        user_id: UserId,
        account_number: AccountNumber,
        currency: Currency,
        account_type: AccountType,
    ) -> Account {
        Account {
            id: AccountId::new(self.inner.next_account_id.fetch_add(1, Ordering::Relaxed)),
            user_id,
            account_number,
            balance: Decimal::ZERO,
            currency,
            account_type,
            created_at: Utc::now(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.inner.check(&Fault::Begin)?;
        Ok(Box::new(MemoryTransaction {
            store: self.inner.clone(),
            held: BTreeMap::new(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct HeldRow {
    row: Arc<AccountRow>,
    staged: Option<Decimal>,
    _guard: OwnedMutexGuard<()>,
}

struct MemoryTransaction {
    store: Arc<Inner>,
    held: BTreeMap<AccountNumber, HeldRow>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_account_for_update(
        &mut self,
        account_number: &AccountNumber,
    ) -> StoreResult<Option<Decimal>> {
        self.store.check(&Fault::Lock(account_number.clone()))?;

        if let Some(held) = self.held.get(account_number) {
            let balance = held
                .staged
                .unwrap_or_else(|| held.row.account.read().balance);
            return Ok(Some(balance));
        }

        let Some(row) = self.store.row(account_number) else {
            return Ok(None);
        };

        let guard = tokio::time::timeout(self.store.lock_timeout, row.lock.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!(account = %account_number, "Row lock wait timed out");
                StoreError::LockTimeout(account_number.clone())
            })?;

        let balance = row.account.read().balance;
        debug!(account = %account_number, balance = %balance, "Row locked");

        self.held.insert(
            account_number.clone(),
            HeldRow {
                row,
                staged: None,
                _guard: guard,
            },
        );

        Ok(Some(balance))
    }

    async fn set_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> StoreResult<()> {
        self.store.check(&Fault::SetBalance(account_number.clone()))?;

        let held = self
            .held
            .get_mut(account_number)
            .ok_or_else(|| StoreError::NotLocked(account_number.clone()))?;
        held.staged = Some(balance);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.store.check(&Fault::Commit)?;

        let _gate = self.store.commit_gate.write();
        for held in self.held.values() {
            if let Some(balance) = held.staged {
                held.row.account.write().balance = balance;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> LedgerResult<User> {
        let username = new_user
            .validated_username()
            .map_err(LedgerError::InvalidRequest)?;

        match self.inner.usernames.entry(username.clone()) {
            Entry::Occupied(_) => Err(LedgerError::InvalidRequest(format!(
                "username {username:?} is already taken"
            ))),
            Entry::Vacant(slot) => {
                let user = User {
                    id: UserId::new(self.inner.next_user_id.fetch_add(1, Ordering::Relaxed)),
                    username,
                    created_at: Utc::now(),
                };
                slot.insert(user.id);
                self.inner.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        self.inner
            .users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    async fn create_account(&self, new_account: NewAccount) -> LedgerResult<Account> {
        if !self.inner.users.contains_key(&new_account.user_id) {
            return Err(LedgerError::InvalidRequest(format!(
                "user {} does not exist",
                new_account.user_id
            )));
        }

        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let account_number = AccountNumber::generate(&mut *self.inner.rng.lock());

            if let Entry::Vacant(slot) = self.inner.accounts.entry(account_number.clone()) {
                let account = self.new_account_record(
                    new_account.user_id,
                    account_number,
                    new_account.currency.clone(),
                    new_account.account_type,
                );
                slot.insert(Arc::new(AccountRow {
                    lock: Arc::new(tokio::sync::Mutex::new(())),
                    account: RwLock::new(account.clone()),
                }));
                return Ok(account);
            }
        }

        Err(LedgerError::StoreFailure(StoreError::Database(
            "could not allocate a free account number".to_string(),
        )))
    }

    async fn get_account(&self, account_number: &AccountNumber) -> LedgerResult<Account> {
        let row = self
            .inner
            .row(account_number)
            .ok_or_else(|| LedgerError::not_found(AccountRole::Account, account_number))?;
        let _gate = self.inner.commit_gate.read();
        let account = row.account.read().clone();
        Ok(account)
    }
}
