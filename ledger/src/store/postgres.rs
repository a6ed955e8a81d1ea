//! PostgreSQL account store.
//!
//! Row locks are `SELECT ... FOR UPDATE`; the lock-wait bound is the
//! transaction-local `lock_timeout` setting, which PostgreSQL reports as
//! SQLSTATE 55P03.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, Row, Transaction};
use tracing::{debug, info, warn};

use ledgerbank_common::{AccountId, AccountNumber, Currency, UserId};

use crate::account::{Account, AccountType, NewAccount, NewUser, User};
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::registry::{Registry, ACCOUNT_NUMBER_ATTEMPTS};
use crate::store::{AccountStore, StoreError, StoreResult, StoreTransaction};

const SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Connection settings for [`PgStore`].
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long a transaction waits for a row lock.
    pub lock_timeout: Duration,
}

impl PgStoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn lock_error(err: sqlx::Error, account_number: &AccountNumber) -> StoreError {
    if sqlstate(&err).as_deref() == Some(LOCK_NOT_AVAILABLE) {
        warn!(account = %account_number, "Row lock wait timed out");
        StoreError::LockTimeout(account_number.clone())
    } else {
        err.into()
    }
}

fn store_failure(err: sqlx::Error) -> LedgerError {
    LedgerError::StoreFailure(err.into())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::StoreFailure(StoreError::Database(format!("corrupt {what}: {detail}")))
}

fn row_to_user(row: &PgRow) -> LedgerResult<User> {
    Ok(User {
        id: UserId::new(row.try_get("id").map_err(store_failure)?),
        username: row.try_get("username").map_err(store_failure)?,
        created_at: row.try_get("created_at").map_err(store_failure)?,
    })
}

fn row_to_account(row: &PgRow) -> LedgerResult<Account> {
    let currency: String = row.try_get("currency").map_err(store_failure)?;
    let account_type: String = row.try_get("account_type").map_err(store_failure)?;
    let account_number: String = row.try_get("account_number").map_err(store_failure)?;

    Ok(Account {
        id: AccountId::new(row.try_get("id").map_err(store_failure)?),
        user_id: UserId::new(row.try_get("user_id").map_err(store_failure)?),
        account_number: AccountNumber::new(account_number),
        balance: row.try_get("balance").map_err(store_failure)?,
        currency: Currency::parse(&currency).map_err(|e| corrupt("currency", e))?,
        account_type: account_type
            .parse::<AccountType>()
            .map_err(|e| corrupt("account type", e))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(store_failure)?,
    })
}

/// Account store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Open a connection pool and verify it with a round trip.
    pub async fn connect(config: &PgStoreConfig) -> StoreResult<Self> {
        info!(max_connections = config.max_connections, "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;

        let store = Self::from_pool(pool, config.lock_timeout);
        store.ping().await?;

        info!("Database connection established");
        Ok(store)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations");
        self.pool.execute(SCHEMA).await?;
        info!("Migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `SET` does not take bind parameters. Postgres reads `0ms` as "wait
/// forever", so the timeout never renders below one millisecond.
fn lock_timeout_statement(timeout: Duration) -> String {
    format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis().max(1))
}

#[async_trait]
impl AccountStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;

        let statement = lock_timeout_statement(self.lock_timeout);
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgTransaction {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<AccountNumber>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_account_for_update(
        &mut self,
        account_number: &AccountNumber,
    ) -> StoreResult<Option<Decimal>> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT balance FROM accounts WHERE account_number = $1 FOR UPDATE",
        )
        .bind(account_number.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| lock_error(e, account_number))?;

        if balance.is_some() {
            debug!(account = %account_number, "Row locked");
            self.locked.insert(account_number.clone());
        }

        Ok(balance)
    }

    async fn set_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> StoreResult<()> {
        if !self.locked.contains(account_number) {
            return Err(StoreError::NotLocked(account_number.clone()));
        }

        let result = sqlx::query("UPDATE accounts SET balance = $1 WHERE account_number = $2")
            .bind(balance)
            .bind(account_number.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowVanished(account_number.clone()));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Registry for PgStore {
    async fn create_user(&self, new_user: NewUser) -> LedgerResult<User> {
        let username = new_user
            .validated_username()
            .map_err(LedgerError::InvalidRequest)?;

        let row = sqlx::query(
            "INSERT INTO users (username) VALUES ($1) RETURNING id, username, created_at",
        )
        .bind(&username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match sqlstate(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => {
                LedgerError::InvalidRequest(format!("username {username:?} is already taken"))
            }
            _ => store_failure(e),
        })?;

        let user = row_to_user(&row)?;
        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        let row = sqlx::query("SELECT id, username, created_at FROM users WHERE id = $1")
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_failure)?;

        match row {
            Some(row) => row_to_user(&row),
            None => Err(LedgerError::UserNotFound(user_id)),
        }
    }

    async fn create_account(&self, new_account: NewAccount) -> LedgerResult<Account> {
        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(new_account.user_id.get())
                .fetch_one(&self.pool)
                .await
                .map_err(store_failure)?;

        let missing_user = || {
            LedgerError::InvalidRequest(format!("user {} does not exist", new_account.user_id))
        };

        if !user_exists {
            return Err(missing_user());
        }

        for attempt in 1..=ACCOUNT_NUMBER_ATTEMPTS {
            let account_number = AccountNumber::generate(&mut rand::thread_rng());

            let inserted = sqlx::query(
                r#"
                INSERT INTO accounts (user_id, account_number, balance, currency, account_type)
                VALUES ($1, $2, 0, $3, $4)
                RETURNING id, user_id, account_number, balance, currency, account_type, created_at
                "#,
            )
            .bind(new_account.user_id.get())
            .bind(account_number.as_str())
            .bind(new_account.currency.code())
            .bind(new_account.account_type.as_str())
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => {
                    let account = row_to_account(&row)?;
                    info!(
                        account = %account.account_number,
                        user_id = %account.user_id,
                        "Account opened"
                    );
                    return Ok(account);
                }
                Err(e) => match sqlstate(&e).as_deref() {
                    Some(UNIQUE_VIOLATION) => {
                        debug!(attempt, "Account number collision, drawing another");
                    }
                    Some(FOREIGN_KEY_VIOLATION) => return Err(missing_user()),
                    _ => return Err(store_failure(e)),
                },
            }
        }

        Err(LedgerError::StoreFailure(StoreError::Database(
            "could not allocate a free account number".to_string(),
        )))
    }

    async fn get_account(&self, account_number: &AccountNumber) -> LedgerResult<Account> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, account_number, balance, currency, account_type, created_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_failure)?;

        match row {
            Some(row) => row_to_account(&row),
            None => Err(LedgerError::not_found(AccountRole::Account, account_number)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_statement() {
        assert_eq!(
            lock_timeout_statement(Duration::from_secs(5)),
            "SET LOCAL lock_timeout = '5000ms'"
        );
        assert_eq!(
            lock_timeout_statement(Duration::from_micros(300)),
            "SET LOCAL lock_timeout = '1ms'"
        );
        assert_eq!(
            lock_timeout_statement(Duration::ZERO),
            "SET LOCAL lock_timeout = '1ms'"
        );
    }
}
